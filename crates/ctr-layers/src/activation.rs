//! Activation function layers.
//!
//! This module provides the element-wise activations used by the CTR models
//! (ReLU, Sigmoid, Tanh) as layers, plus [`ActivationType`] for selecting one
//! by name in a model configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Numerically stable logistic function.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Activation function selector used by model configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Sigmoid function
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// No activation (identity)
    #[serde(alias = "linear")]
    None,
}

impl FromStr for ActivationType {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(ActivationType::ReLU),
            "sigmoid" => Ok(ActivationType::Sigmoid),
            "tanh" => Ok(ActivationType::Tanh),
            "linear" | "none" => Ok(ActivationType::None),
            other => Err(LayerError::ConfigError {
                message: format!("Unknown activation '{other}'"),
            }),
        }
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationType::ReLU => "relu",
            ActivationType::Sigmoid => "sigmoid",
            ActivationType::Tanh => "tanh",
            ActivationType::None => "linear",
        };
        f.write_str(name)
    }
}

/// Rectified Linear Unit (ReLU) activation function.
///
/// Computes `f(x) = max(0, x)` element-wise.
///
/// # Example
///
/// ```
/// use ctr_layers::activation::ReLU;
/// use ctr_layers::layer::Layer;
/// use ctr_layers::tensor::Tensor;
///
/// let relu = ReLU::new();
/// let input = Tensor::from_data(&[2, 2], vec![-1.0, 0.0, 1.0, 2.0]);
/// let output = relu.forward(&input).unwrap();
/// assert_eq!(output.data(), &[0.0, 0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReLU {
    /// Cached input for backward pass
    cached_input: Option<Tensor>,
}

impl ReLU {
    /// Creates a new ReLU activation layer.
    pub fn new() -> Self {
        Self { cached_input: None }
    }

    /// Performs forward pass and caches input for backward pass.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.cached_input = Some(input.clone());
        self.forward(input)
    }
}

impl Layer for ReLU {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        Ok(input.map(|x| x.max(0.0)))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        check_same_shape(input, grad)?;

        let mask = input.map(|x| if x > 0.0 { 1.0 } else { 0.0 });
        Ok(grad.mul(&mask))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![]
    }

    fn name(&self) -> &str {
        "ReLU"
    }
}

/// Sigmoid activation function.
///
/// Computes `f(x) = 1 / (1 + exp(-x))` element-wise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sigmoid {
    /// Cached output for backward pass
    cached_output: Option<Tensor>,
}

impl Sigmoid {
    /// Creates a new Sigmoid activation layer.
    pub fn new() -> Self {
        Self {
            cached_output: None,
        }
    }

    /// Performs forward pass and caches output for backward pass.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let output = self.forward(input)?;
        self.cached_output = Some(output.clone());
        Ok(output)
    }
}

impl Layer for Sigmoid {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        Ok(input.map(sigmoid))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let output = self
            .cached_output
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        check_same_shape(output, grad)?;

        // sigmoid'(x) = y * (1 - y)
        let grad_multiplier = output.map(|y| y * (1.0 - y));
        Ok(grad.mul(&grad_multiplier))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![]
    }

    fn name(&self) -> &str {
        "Sigmoid"
    }
}

/// Hyperbolic tangent (Tanh) activation function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tanh {
    cached_output: Option<Tensor>,
}

impl Tanh {
    /// Creates a new Tanh activation layer.
    pub fn new() -> Self {
        Self {
            cached_output: None,
        }
    }

    /// Performs forward pass and caches output for backward pass.
    pub fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let output = self.forward(input)?;
        self.cached_output = Some(output.clone());
        Ok(output)
    }
}

impl Layer for Tanh {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        Ok(input.map(f32::tanh))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let output = self
            .cached_output
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        check_same_shape(output, grad)?;

        let grad_multiplier = output.map(|y| 1.0 - y * y);
        Ok(grad.mul(&grad_multiplier))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![]
    }

    fn name(&self) -> &str {
        "Tanh"
    }
}

fn check_same_shape(cached: &Tensor, grad: &Tensor) -> Result<(), LayerError> {
    if cached.shape() != grad.shape() {
        return Err(LayerError::ShapeMismatch {
            expected: cached.shape().to_vec(),
            actual: grad.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_forward_backward() {
        let mut relu = ReLU::new();
        let input = Tensor::from_data(&[1, 4], vec![-1.0, 0.0, 2.0, 3.0]);
        let out = relu.forward_train(&input).unwrap();
        assert_eq!(out.data(), &[0.0, 0.0, 2.0, 3.0]);

        let g = relu.backward(&Tensor::ones(&[1, 4])).unwrap();
        assert_eq!(g.data(), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_sigmoid_is_stable_for_large_inputs() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-1000.0).is_finite());
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0) >= 0.0);
    }

    #[test]
    fn test_sigmoid_backward() {
        let mut s = Sigmoid::new();
        let _ = s.forward_train(&Tensor::zeros(&[1, 1])).unwrap();
        let g = s.backward(&Tensor::ones(&[1, 1])).unwrap();
        assert!((g.data()[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_backward() {
        let mut t = Tanh::new();
        let _ = t.forward_train(&Tensor::zeros(&[2, 1])).unwrap();
        let g = t.backward(&Tensor::ones(&[2, 1])).unwrap();
        assert_eq!(g.data(), &[1.0, 1.0]);
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut relu = ReLU::new();
        assert!(matches!(
            relu.backward(&Tensor::ones(&[1, 1])),
            Err(LayerError::NotInitialized)
        ));
    }

    #[test]
    fn test_activation_type_parsing() {
        assert_eq!("relu".parse::<ActivationType>().unwrap(), ActivationType::ReLU);
        assert_eq!("TANH".parse::<ActivationType>().unwrap(), ActivationType::Tanh);
        assert_eq!("linear".parse::<ActivationType>().unwrap(), ActivationType::None);
        assert!("swish".parse::<ActivationType>().is_err());
        assert_eq!(ActivationType::Sigmoid.to_string(), "sigmoid");
    }
}
