//! Feed-forward deep network used by the deep half of DeepFM.
//!
//! [`Dnn`] is a stack of dense layers sharing one activation, followed by a
//! single dropout on the last hidden output. The scalar output layer is owned
//! by the model, not by the network.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;
use crate::activation_layer::ActivationLayer;
use crate::dense::Dense;
use crate::dropout::Dropout;
use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// Configuration for building a [`Dnn`].
///
/// # Example
///
/// ```
/// use ctr_layers::mlp::DnnConfig;
/// use ctr_layers::activation::ActivationType;
///
/// let config = DnnConfig::new(128)
///     .with_hidden_units(vec![64, 32])
///     .with_activation(ActivationType::Tanh)
///     .with_dropout(0.2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnnConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Hidden layer widths
    pub hidden_units: Vec<usize>,
    /// Activation after every hidden layer
    pub activation: ActivationType,
    /// Dropout rate applied once after the last hidden layer
    pub dropout_rate: f32,
}

impl DnnConfig {
    /// Creates a configuration with the DeepFM defaults (`[200, 200, 200]`, relu, no dropout).
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_units: vec![200, 200, 200],
            activation: ActivationType::ReLU,
            dropout_rate: 0.0,
        }
    }

    /// Sets the hidden layer widths.
    pub fn with_hidden_units(mut self, hidden_units: Vec<usize>) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Sets the hidden activation.
    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    /// Sets the dropout rate.
    pub fn with_dropout(mut self, rate: f32) -> Self {
        self.dropout_rate = rate;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.input_dim == 0 {
            return Err(LayerError::ConfigError {
                message: "Input dimension must be positive".to_string(),
            });
        }
        if self.hidden_units.is_empty() {
            return Err(LayerError::ConfigError {
                message: "DNN must have at least one hidden layer".to_string(),
            });
        }
        for (i, dim) in self.hidden_units.iter().enumerate() {
            if *dim == 0 {
                return Err(LayerError::ConfigError {
                    message: format!("Layer {i} has zero output dimension"),
                });
            }
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(LayerError::ConfigError {
                message: "Dropout rate must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the network, drawing weights and the dropout seed from `rng`.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Dnn, LayerError> {
        Dnn::from_config(self, rng)
    }
}

/// Stacked dense layers with a trailing dropout.
#[derive(Debug, Clone)]
pub struct Dnn {
    dense_layers: Vec<Dense>,
    activations: Vec<ActivationLayer>,
    dropout: Dropout,
    config: DnnConfig,
    training: bool,
}

impl Dnn {
    /// Creates a network from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config<R: Rng + ?Sized>(config: DnnConfig, rng: &mut R) -> Result<Self, LayerError> {
        config.validate()?;

        let mut dense_layers = Vec::with_capacity(config.hidden_units.len());
        let mut activations = Vec::with_capacity(config.hidden_units.len());
        let mut prev_dim = config.input_dim;
        for &units in &config.hidden_units {
            dense_layers.push(Dense::new(prev_dim, units, rng));
            activations.push(ActivationLayer::from_activation_type(config.activation));
            prev_dim = units;
        }
        let dropout = Dropout::new(config.dropout_rate, rng.gen())?;

        Ok(Self {
            dense_layers,
            activations,
            dropout,
            config,
            training: true,
        })
    }

    /// Returns the number of dense layers.
    pub fn num_layers(&self) -> usize {
        self.dense_layers.len()
    }

    /// Returns the dense layers.
    pub fn dense_layers(&self) -> &[Dense] {
        &self.dense_layers
    }

    /// Returns the configuration used to build this network.
    pub fn config(&self) -> &DnnConfig {
        &self.config
    }

    /// Returns the width of the last hidden layer.
    pub fn output_dim(&self) -> usize {
        self.config
            .hidden_units
            .last()
            .copied()
            .unwrap_or(self.config.input_dim)
    }

    /// Performs forward pass with training mode (caches activations).
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let mut x = input.clone();
        for (dense, activation) in self
            .dense_layers
            .iter_mut()
            .zip(self.activations.iter_mut())
        {
            x = dense.forward_train(&x)?;
            x = activation.forward_train(&x)?;
        }
        self.dropout.forward_train(&x)
    }
}

impl Layer for Dnn {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let mut x = input.clone();
        for (dense, activation) in self.dense_layers.iter().zip(self.activations.iter()) {
            x = dense.forward(&x)?;
            x = activation.forward(&x)?;
        }
        Ok(x)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let mut g = self.dropout.backward(grad)?;
        for (dense, activation) in self
            .dense_layers
            .iter_mut()
            .zip(self.activations.iter_mut())
            .rev()
        {
            g = activation.backward(&g)?;
            g = dense.backward(&g)?;
        }
        Ok(g)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.dense_layers
            .iter()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.dense_layers
            .iter_mut()
            .flat_map(|layer| layer.parameters_mut())
            .collect()
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        self.dense_layers
            .iter()
            .flat_map(|layer| layer.gradients())
            .collect()
    }

    fn regularization_loss(&self) -> f32 {
        self.dense_layers
            .iter()
            .map(|layer| layer.regularization_loss())
            .sum()
    }

    fn name(&self) -> &str {
        "DNN"
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.dropout.set_training(training);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_dnn_config_defaults() {
        let config = DnnConfig::new(16);
        assert_eq!(config.hidden_units, vec![200, 200, 200]);
        assert_eq!(config.activation, ActivationType::ReLU);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dnn_config_invalid() {
        assert!(DnnConfig::new(0).validate().is_err());
        assert!(DnnConfig::new(4).with_hidden_units(vec![]).validate().is_err());
        assert!(DnnConfig::new(4).with_hidden_units(vec![3, 0]).validate().is_err());
        assert!(DnnConfig::new(4).with_dropout(1.0).validate().is_err());
    }

    #[test]
    fn test_dnn_forward_shape() {
        let dnn = DnnConfig::new(10)
            .with_hidden_units(vec![5, 3])
            .build(&mut rng())
            .unwrap();
        let output = dnn.forward(&Tensor::ones(&[4, 10])).unwrap();
        assert_eq!(output.shape(), &[4, 3]);
        assert_eq!(dnn.output_dim(), 3);
        assert_eq!(dnn.num_layers(), 2);
    }

    #[test]
    fn test_dnn_backward_shapes_and_gradients() {
        let mut dnn = DnnConfig::new(6)
            .with_hidden_units(vec![4, 2])
            .with_activation(ActivationType::Tanh)
            .build(&mut rng())
            .unwrap();
        dnn.forward_train(&Tensor::rand(&[3, 6])).unwrap();
        let dx = dnn.backward(&Tensor::ones(&[3, 2])).unwrap();
        assert_eq!(dx.shape(), &[3, 6]);

        let grads = dnn.gradients();
        assert_eq!(grads.len(), dnn.parameters().len());
        assert!(grads.iter().all(Option::is_some));
    }

    #[test]
    fn test_dnn_training_matches_inference_without_dropout() {
        let mut dnn = DnnConfig::new(5)
            .with_hidden_units(vec![3])
            .build(&mut rng())
            .unwrap();
        let x = Tensor::rand(&[2, 5]);
        let train = dnn.forward_train(&x).unwrap();
        let infer = dnn.forward(&x).unwrap();
        assert_eq!(train, infer);
    }

    #[test]
    fn test_dnn_set_training_propagates() {
        let mut dnn = DnnConfig::new(5)
            .with_hidden_units(vec![3])
            .with_dropout(0.5)
            .build(&mut rng())
            .unwrap();
        dnn.set_training(false);
        assert!(!dnn.is_training());
        let x = Tensor::rand(&[2, 5]);
        assert_eq!(dnn.forward_train(&x).unwrap(), dnn.forward(&x).unwrap());
    }
}
