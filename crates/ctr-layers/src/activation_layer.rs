//! Shared activation layer wrapper for reuse across composite layers.

use crate::activation::{ActivationType, ReLU, Sigmoid, Tanh};
use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// An activation chosen at build time from an [`ActivationType`].
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone)]
pub enum ActivationLayer {
    /// Rectified linear unit
    ReLU(ReLU),
    /// Logistic sigmoid
    Sigmoid(Sigmoid),
    /// Hyperbolic tangent
    Tanh(Tanh),
    /// Identity
    None,
}

impl ActivationLayer {
    /// Builds the layer for `activation`.
    pub fn from_activation_type(activation: ActivationType) -> Self {
        match activation {
            ActivationType::ReLU => ActivationLayer::ReLU(ReLU::new()),
            ActivationType::Sigmoid => ActivationLayer::Sigmoid(Sigmoid::new()),
            ActivationType::Tanh => ActivationLayer::Tanh(Tanh::new()),
            ActivationType::None => ActivationLayer::None,
        }
    }

    /// Inference forward pass.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        match self {
            Self::ReLU(a) => a.forward(input),
            Self::Sigmoid(a) => a.forward(input),
            Self::Tanh(a) => a.forward(input),
            Self::None => Ok(input.clone()),
        }
    }

    /// Training forward pass; caches what backward needs.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        match self {
            Self::ReLU(a) => a.forward_train(input),
            Self::Sigmoid(a) => a.forward_train(input),
            Self::Tanh(a) => a.forward_train(input),
            Self::None => Ok(input.clone()),
        }
    }

    /// Backward pass.
    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        match self {
            Self::ReLU(a) => a.backward(grad),
            Self::Sigmoid(a) => a.backward(grad),
            Self::Tanh(a) => a.backward(grad),
            Self::None => Ok(grad.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passes_through() {
        let mut act = ActivationLayer::from_activation_type(ActivationType::None);
        let x = Tensor::from_data(&[1, 2], vec![-3.0, 4.0]);
        assert_eq!(act.forward_train(&x).unwrap(), x);
        assert_eq!(act.backward(&x).unwrap(), x);
    }

    #[test]
    fn test_dispatch_matches_inner_layer() {
        let act = ActivationLayer::from_activation_type(ActivationType::ReLU);
        let x = Tensor::from_data(&[1, 2], vec![-3.0, 4.0]);
        assert_eq!(act.forward(&x).unwrap().data(), &[0.0, 4.0]);
    }
}
