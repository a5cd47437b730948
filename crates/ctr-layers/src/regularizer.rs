//! Regularization utilities for learnable parameters.
//!
//! Semantics follow Keras: `L2(λ)` contributes `λ·Σw²` to the loss and
//! `2λ·w` to the gradient.

use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Regularizer types supported for layer parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum Regularizer {
    /// No regularization.
    #[default]
    None,
    /// L1 regularization with coefficient.
    L1(f32),
    /// L2 regularization with coefficient.
    L2(f32),
    /// Combined L1 + L2 regularization.
    L1L2 {
        /// L1 coefficient
        l1: f32,
        /// L2 coefficient
        l2: f32,
    },
}

impl Regularizer {
    /// Returns the regularization loss for the given parameter tensor.
    pub fn loss(&self, param: &Tensor) -> f32 {
        match *self {
            Regularizer::None => 0.0,
            Regularizer::L1(lambda) => param.abs().sum() * lambda,
            Regularizer::L2(lambda) => param.sqr().sum() * lambda,
            Regularizer::L1L2 { l1, l2 } => param.abs().sum() * l1 + param.sqr().sum() * l2,
        }
    }

    /// Returns the gradient contribution of this regularizer for the given parameter.
    pub fn grad(&self, param: &Tensor) -> Option<Tensor> {
        match *self {
            Regularizer::None => None,
            Regularizer::L1(lambda) => Some(param.map(|w| sign(w) * lambda)),
            Regularizer::L2(lambda) => Some(param.scale(2.0 * lambda)),
            Regularizer::L1L2 { l1, l2 } => Some(param.map(|w| sign(w) * l1 + 2.0 * l2 * w)),
        }
    }

    /// Adds this regularizer's gradient for `param` into `grad` in place.
    pub fn accumulate_grad(&self, param: &Tensor, grad: &mut Tensor) {
        if let Some(reg_grad) = self.grad(param) {
            grad.add_assign(&reg_grad);
        }
    }
}

fn sign(w: f32) -> f32 {
    if w > 0.0 {
        1.0
    } else if w < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_loss_and_grad() {
        let w = Tensor::from_data(&[3], vec![1.0, -2.0, 0.0]);
        let reg = Regularizer::L2(0.1);
        assert!((reg.loss(&w) - 0.5).abs() < 1e-6);
        assert_eq!(reg.grad(&w).unwrap().data(), &[0.2, -0.4, 0.0]);
    }

    #[test]
    fn test_l1_grad_is_sign() {
        let w = Tensor::from_data(&[3], vec![3.0, -0.5, 0.0]);
        let grad = Regularizer::L1(1.0).grad(&w).unwrap();
        assert_eq!(grad.data(), &[1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_none_is_free() {
        let w = Tensor::ones(&[4]);
        assert_eq!(Regularizer::None.loss(&w), 0.0);
        assert!(Regularizer::None.grad(&w).is_none());

        let mut g = Tensor::zeros(&[4]);
        Regularizer::None.accumulate_grad(&w, &mut g);
        assert_eq!(g.sum(), 0.0);
    }
}
