//! Layer trait definition for neural network layers.
//!
//! Every trainable building block implements [`Layer`]. Training uses a
//! two-phase protocol: a `forward_train` call (inherent on each layer) caches
//! whatever the backward pass needs, then [`Layer::backward`] turns the output
//! gradient into an input gradient and stores parameter gradients that an
//! optimizer can read through [`Layer::gradients`].

use crate::error::LayerError;
use crate::tensor::Tensor;

/// A neural network layer that supports forward and backward propagation.
///
/// # Example
///
/// ```
/// use ctr_layers::dense::Dense;
/// use ctr_layers::layer::Layer;
/// use ctr_layers::tensor::Tensor;
/// use rand::SeedableRng;
///
/// let layer = Dense::new(16, 4, &mut rand::rngs::StdRng::seed_from_u64(0));
/// let input = Tensor::zeros(&[8, 16]);
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[8, 4]);
/// ```
pub trait Layer: Send + Sync {
    /// Performs an inference forward pass.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the input shape is incompatible with the layer
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError>;

    /// Performs a backward pass through the layer.
    ///
    /// Takes the gradient of the loss with respect to the layer's output and
    /// returns the gradient with respect to the layer's input. Parameter
    /// gradients (including regularization terms) are stored on the layer.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotInitialized`] if no training forward pass was
    /// cached, or a shape error if `grad` does not match the cached output.
    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError>;

    /// Returns references to the layer's learnable parameters.
    fn parameters(&self) -> Vec<&Tensor>;

    /// Returns mutable references to the layer's learnable parameters.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Returns the gradients computed by the last backward pass.
    ///
    /// The vector is aligned with [`Layer::parameters`]; an entry is `None`
    /// when no gradient is available for that parameter.
    fn gradients(&self) -> Vec<Option<&Tensor>>;

    /// Returns the regularization loss contributed by this layer.
    fn regularization_loss(&self) -> f32 {
        0.0
    }

    /// Returns the name of the layer for debugging and logging purposes.
    fn name(&self) -> &str {
        "Layer"
    }

    /// Returns whether the layer is in training mode.
    fn is_training(&self) -> bool {
        true
    }

    /// Sets the layer's training mode.
    fn set_training(&mut self, _training: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLayer {
        weight: Tensor,
        weight_grad: Option<Tensor>,
        training: bool,
    }

    impl MockLayer {
        fn new() -> Self {
            Self {
                weight: Tensor::zeros(&[10, 10]),
                weight_grad: None,
                training: true,
            }
        }
    }

    impl Layer for MockLayer {
        fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
            Ok(input.clone())
        }

        fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
            self.weight_grad = Some(Tensor::ones(&[10, 10]));
            Ok(grad.clone())
        }

        fn parameters(&self) -> Vec<&Tensor> {
            vec![&self.weight]
        }

        fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
            vec![&mut self.weight]
        }

        fn gradients(&self) -> Vec<Option<&Tensor>> {
            vec![self.weight_grad.as_ref()]
        }

        fn name(&self) -> &str {
            "MockLayer"
        }

        fn is_training(&self) -> bool {
            self.training
        }

        fn set_training(&mut self, training: bool) {
            self.training = training;
        }
    }

    #[test]
    fn test_layer_trait() {
        let mut layer = MockLayer::new();
        let input = Tensor::zeros(&[2, 10]);

        let output = layer.forward(&input).unwrap();
        assert_eq!(output.shape(), input.shape());
        assert!(layer.gradients()[0].is_none());

        let grad = Tensor::ones(&[2, 10]);
        let input_grad = layer.backward(&grad).unwrap();
        assert_eq!(input_grad.shape(), grad.shape());

        assert_eq!(layer.parameters().len(), layer.gradients().len());
        assert!(layer.gradients()[0].is_some());
        assert_eq!(layer.name(), "MockLayer");
        assert_eq!(layer.regularization_loss(), 0.0);
    }

    #[test]
    fn test_training_mode() {
        let mut layer = MockLayer::new();
        assert!(layer.is_training());

        layer.set_training(false);
        assert!(!layer.is_training());
    }
}
