//! Dense (fully connected) layer implementation.
//!
//! This module provides the [`Dense`] layer, which performs a linear transformation
//! `y = xW + b` where W is the weight matrix and b is the bias vector.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::regularizer::Regularizer;
use crate::tensor::Tensor;

/// A dense (fully connected) neural network layer.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[..., in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
/// - `y` is the output tensor of shape `[..., out_features]`
///
/// Inputs of rank greater than two are flattened over the leading axes, so
/// the same layer can score every pair of a `[batch, pairs, k]` tensor.
///
/// # Example
///
/// ```
/// use ctr_layers::dense::Dense;
/// use ctr_layers::layer::Layer;
/// use ctr_layers::tensor::Tensor;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let layer = Dense::new(128, 64, &mut rng);
/// let input = Tensor::zeros(&[32, 128]);
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[32, 64]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    weights: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    kernel_regularizer: Regularizer,
    weights_grad: Option<Tensor>,
    bias_grad: Option<Tensor>,
    /// Cached input for backward pass
    cached_input: Option<Tensor>,
    in_features: usize,
    out_features: usize,
    use_bias: bool,
}

impl Dense {
    /// Creates a dense layer with a Glorot uniform kernel and zero bias.
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        Self::new_with_initializer(in_features, out_features, Initializer::GlorotUniform, rng)
    }

    /// Creates a dense layer with a custom kernel initializer and zero bias.
    pub fn new_with_initializer<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        initializer: Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: initializer.initialize(&[in_features, out_features], rng),
            bias: Tensor::zeros(&[out_features]),
            kernel_regularizer: Regularizer::None,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features,
            out_features,
            use_bias: true,
        }
    }

    /// Creates a dense layer without a bias term.
    pub fn new_no_bias<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        initializer: Initializer,
        rng: &mut R,
    ) -> Self {
        let mut layer = Self::new_with_initializer(in_features, out_features, initializer, rng);
        layer.use_bias = false;
        layer
    }

    /// Creates a dense layer from explicit weights and bias.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ShapeMismatch`] unless `weights` is 2D and
    /// `bias` has shape `[weights.shape()[1]]`.
    pub fn from_weights(weights: Tensor, bias: Tensor) -> Result<Self, LayerError> {
        if weights.ndim() != 2 {
            return Err(LayerError::ShapeMismatch {
                expected: vec![0, 0],
                actual: weights.shape().to_vec(),
            });
        }
        let in_features = weights.shape()[0];
        let out_features = weights.shape()[1];
        if bias.shape() != [out_features] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![out_features],
                actual: bias.shape().to_vec(),
            });
        }

        Ok(Self {
            weights,
            bias,
            kernel_regularizer: Regularizer::None,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features,
            out_features,
            use_bias: true,
        })
    }

    /// Sets the kernel regularizer.
    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = regularizer;
        self
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns a reference to the weights.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns a reference to the bias.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Returns whether the layer adds a bias.
    pub fn has_bias(&self) -> bool {
        self.use_bias
    }

    /// Returns the weight gradient from the last backward pass.
    pub fn weights_grad(&self) -> Option<&Tensor> {
        self.weights_grad.as_ref()
    }

    /// Returns the bias gradient from the last backward pass.
    pub fn bias_grad(&self) -> Option<&Tensor> {
        self.bias_grad.as_ref()
    }

    /// Performs forward pass and caches input for backward pass.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.cached_input = Some(input.clone());
        self.forward(input)
    }
}

impl Layer for Dense {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        if input.ndim() < 2 {
            return Err(LayerError::ForwardError {
                message: format!("Expected >=2D input, got {}D", input.ndim()),
            });
        }
        let in_dim = input.last_dim();
        if in_dim != self.in_features {
            return Err(LayerError::InvalidInputDimension {
                expected: self.in_features,
                actual: in_dim,
            });
        }

        let rows = input.numel() / in_dim;
        let mut output = input.reshape(&[rows, in_dim]).matmul(&self.weights);
        if self.use_bias {
            output = output.add(&self.bias);
        }
        let mut out_shape = input.shape().to_vec();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features;
        }
        Ok(output.reshape(&out_shape))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        let mut expected = input.shape().to_vec();
        if let Some(last) = expected.last_mut() {
            *last = self.out_features;
        }
        if grad.shape() != expected.as_slice() {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: grad.shape().to_vec(),
            });
        }

        let rows = input.numel() / self.in_features;
        let input_2d = input.reshape(&[rows, self.in_features]);
        let grad_2d = grad.reshape(&[rows, self.out_features]);

        // dL/dW = x^T @ dL/dy
        let mut weights_grad = input_2d.transpose().matmul(&grad_2d);
        self.kernel_regularizer
            .accumulate_grad(&self.weights, &mut weights_grad);
        self.weights_grad = Some(weights_grad);

        // dL/db = sum(dL/dy, axis=0)
        if self.use_bias {
            self.bias_grad = Some(grad_2d.sum_axis(0));
        }

        // dL/dx = dL/dy @ W^T
        let input_grad = grad_2d.matmul(&self.weights.transpose());
        Ok(input_grad.reshape(input.shape()))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = vec![&self.weights];
        if self.use_bias {
            params.push(&self.bias);
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.weights];
        if self.use_bias {
            params.push(&mut self.bias);
        }
        params
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        let mut grads = vec![self.weights_grad.as_ref()];
        if self.use_bias {
            grads.push(self.bias_grad.as_ref());
        }
        grads
    }

    fn regularization_loss(&self) -> f32 {
        self.kernel_regularizer.loss(&self.weights)
    }

    fn name(&self) -> &str {
        "Dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_dense_creation() {
        let layer = Dense::new(64, 32, &mut rng());
        assert_eq!(layer.in_features(), 64);
        assert_eq!(layer.out_features(), 32);
        assert_eq!(layer.weights().shape(), &[64, 32]);
        assert!(layer.bias().data().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_dense_forward() {
        let w = Tensor::from_data(&[2, 1], vec![1.0, 2.0]);
        let b = Tensor::from_data(&[1], vec![0.5]);
        let layer = Dense::from_weights(w, b).unwrap();
        let x = Tensor::from_data(&[2, 2], vec![1.0, 1.0, 2.0, -1.0]);
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.data(), &[3.5, 0.5]);
    }

    #[test]
    fn test_dense_forward_higher_rank() {
        let layer = Dense::new(4, 3, &mut rng());
        let x = Tensor::ones(&[2, 5, 4]);
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[2, 5, 3]);
    }

    #[test]
    fn test_dense_forward_invalid_input() {
        let layer = Dense::new(4, 3, &mut rng());
        assert!(matches!(
            layer.forward(&Tensor::ones(&[2, 5])),
            Err(LayerError::InvalidInputDimension { expected: 4, actual: 5 })
        ));
        assert!(layer.forward(&Tensor::ones(&[4])).is_err());
    }

    #[test]
    fn test_dense_backward() {
        let w = Tensor::from_data(&[2, 1], vec![1.0, 2.0]);
        let b = Tensor::from_data(&[1], vec![0.0]);
        let mut layer = Dense::from_weights(w, b).unwrap();
        let x = Tensor::from_data(&[2, 2], vec![1.0, 3.0, 2.0, 4.0]);
        layer.forward_train(&x).unwrap();

        let dx = layer.backward(&Tensor::ones(&[2, 1])).unwrap();
        assert_eq!(dx.data(), &[1.0, 2.0, 1.0, 2.0]);
        assert_eq!(layer.weights_grad().unwrap().data(), &[3.0, 7.0]);
        assert_eq!(layer.bias_grad().unwrap().data(), &[2.0]);
    }

    #[test]
    fn test_dense_backward_includes_regularizer() {
        let w = Tensor::from_data(&[1, 1], vec![2.0]);
        let b = Tensor::from_data(&[1], vec![0.0]);
        let mut layer = Dense::from_weights(w, b)
            .unwrap()
            .with_kernel_regularizer(Regularizer::L2(0.5));
        layer.forward_train(&Tensor::zeros(&[1, 1])).unwrap();
        layer.backward(&Tensor::zeros(&[1, 1])).unwrap();
        // 2 * 0.5 * 2.0
        assert_eq!(layer.weights_grad().unwrap().data(), &[2.0]);
        assert_eq!(layer.regularization_loss(), 2.0);
    }

    #[test]
    fn test_dense_parameters_align_with_gradients() {
        let mut layer = Dense::new(3, 2, &mut rng());
        assert_eq!(layer.parameters().len(), 2);
        assert_eq!(layer.gradients(), vec![None, None]);
        layer.forward_train(&Tensor::ones(&[1, 3])).unwrap();
        layer.backward(&Tensor::ones(&[1, 2])).unwrap();
        assert!(layer.gradients().iter().all(Option::is_some));
    }

    #[test]
    fn test_dense_no_bias() {
        let layer = Dense::new_no_bias(3, 2, Initializer::Ones, &mut rng());
        assert!(!layer.has_bias());
        assert_eq!(layer.parameters().len(), 1);
    }

    #[test]
    fn test_dense_from_weights_invalid() {
        let w = Tensor::zeros(&[3, 2]);
        let b = Tensor::zeros(&[3]);
        assert!(Dense::from_weights(w, b).is_err());
    }
}
