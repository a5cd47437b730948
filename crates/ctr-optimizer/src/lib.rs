//! Gradient-descent optimizers for CTR model parameters.
//!
//! Each optimizer implements the [`Optimizer`] trait and updates one flat
//! parameter buffer from a gradient buffer of the same length. The trainer
//! keeps one optimizer instance per parameter tensor, so per-element state
//! (moments, accumulators) lines up with that tensor.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Adagrad`] - Adaptive Gradient Algorithm
//! - [`Adam`] - Adaptive Moment Estimation (the default)
//!
//! Defaults follow Keras (`Adam`: lr 0.001, β1 0.9, β2 0.999, ε 1e-7).
//!
//! # Example
//!
//! ```
//! use ctr_optimizer::{create_optimizer, OptimizerConfig};
//!
//! let mut optimizer = create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
//!
//! let mut weights = vec![1.0, 2.0, 3.0];
//! optimizer.apply_gradients(&mut weights, &[1.0, 1.0, 1.0]).unwrap();
//! assert!((weights[0] - 0.9).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adagrad;
mod adam;
mod sgd;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// Optimizer the config was passed to
        expected: String,
        /// Optimizer the config describes
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Parameter and gradient buffers differ in length.
    #[error("Gradient length {gradients} does not match parameter length {parameters}")]
    LengthMismatch {
        /// Parameter buffer length
        parameters: usize,
        /// Gradient buffer length
        gradients: usize,
    },
}

/// Configuration for the supported optimizers.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "adam", "learning_rate": 0.001}`; omitted fields take the Keras
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        #[serde(default = "default_sgd_learning_rate")]
        learning_rate: f32,
    },

    /// Adagrad configuration.
    Adagrad {
        /// Learning rate for gradient updates.
        #[serde(default = "default_learning_rate")]
        learning_rate: f32,
        /// Initial value for the accumulator.
        #[serde(default = "default_initial_accumulator")]
        initial_accumulator: f32,
        /// Small constant for numerical stability.
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },

    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        #[serde(default = "default_learning_rate")]
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        #[serde(default = "default_beta1")]
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        #[serde(default = "default_beta2")]
        beta2: f32,
        /// Small constant for numerical stability.
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
}

fn default_sgd_learning_rate() -> f32 {
    0.01
}

fn default_learning_rate() -> f32 {
    0.001
}

fn default_initial_accumulator() -> f32 {
    0.1
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-7
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adam(default_learning_rate())
    }
}

impl OptimizerConfig {
    /// Adam with Keras defaults and the given learning rate.
    pub fn adam(learning_rate: f32) -> Self {
        OptimizerConfig::Adam {
            learning_rate,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }

    /// Adagrad with Keras defaults and the given learning rate.
    pub fn adagrad(learning_rate: f32) -> Self {
        OptimizerConfig::Adagrad {
            learning_rate,
            initial_accumulator: default_initial_accumulator(),
            epsilon: default_epsilon(),
        }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adagrad { .. } => "Adagrad",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate }
            | OptimizerConfig::Adagrad { learning_rate, .. }
            | OptimizerConfig::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    /// Returns a copy with the learning rate replaced.
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        match &mut self {
            OptimizerConfig::Sgd { learning_rate }
            | OptimizerConfig::Adagrad { learning_rate, .. }
            | OptimizerConfig::Adam { learning_rate, .. } => *learning_rate = lr,
        }
        self
    }

    /// Checks that every hyperparameter is in range.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {lr}"
            )));
        }
        match *self {
            OptimizerConfig::Sgd { .. } => Ok(()),
            OptimizerConfig::Adagrad {
                initial_accumulator,
                epsilon,
                ..
            } => {
                if initial_accumulator < 0.0 || epsilon < 0.0 {
                    return Err(OptimizerError::InvalidParameter(
                        "Adagrad accumulator and epsilon must be non-negative".to_string(),
                    ));
                }
                Ok(())
            }
            OptimizerConfig::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "Adam betas must be in [0, 1), got beta1={beta1}, beta2={beta2}"
                    )));
                }
                if epsilon < 0.0 {
                    return Err(OptimizerError::InvalidParameter(
                        "Adam epsilon must be non-negative".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Trait for parameter optimizers.
///
/// An instance owns the state for exactly one parameter buffer.
pub trait Optimizer {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>
    where
        Self: Sized;

    /// Applies one update step to `params` in place.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::LengthMismatch`] if the buffers differ in length.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) -> Result<(), OptimizerError>;

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Clears accumulated state.
    fn reset_state(&mut self) {}
}

pub(crate) fn check_lengths(params: &[f32], gradients: &[f32]) -> Result<(), OptimizerError> {
    if params.len() != gradients.len() {
        return Err(OptimizerError::LengthMismatch {
            parameters: params.len(),
            gradients: gradients.len(),
        });
    }
    Ok(())
}

/// Creates a boxed optimizer from the given configuration.
///
/// # Errors
///
/// Returns [`OptimizerError::InvalidParameter`] if the configuration fails
/// [`OptimizerConfig::validate`].
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn Optimizer>, OptimizerError> {
    config.validate()?;
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adagrad { .. } => Box::new(Adagrad::new(config)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name() {
        assert_eq!(OptimizerConfig::Sgd { learning_rate: 0.01 }.name(), "Sgd");
        assert_eq!(OptimizerConfig::default().name(), "Adam");
        assert_eq!(OptimizerConfig::adagrad(0.01).name(), "Adagrad");
    }

    #[test]
    fn test_default_is_keras_adam() {
        assert_eq!(
            OptimizerConfig::default(),
            OptimizerConfig::Adam {
                learning_rate: 0.001,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-7,
            }
        );
    }

    #[test]
    fn test_with_learning_rate() {
        let config = OptimizerConfig::default().with_learning_rate(0.05);
        assert!((config.learning_rate() - 0.05).abs() < 1e-9);
        assert_eq!(config.name(), "Adam");
    }

    #[test]
    fn test_validate() {
        assert!(OptimizerConfig::Sgd { learning_rate: 0.0 }.validate().is_err());
        assert!(OptimizerConfig::Adam {
            learning_rate: 0.001,
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-7,
        }
        .validate()
        .is_err());
        assert!(OptimizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_create_all_optimizer_types() {
        for config in [
            OptimizerConfig::Sgd { learning_rate: 0.01 },
            OptimizerConfig::adagrad(0.01),
            OptimizerConfig::default(),
        ] {
            let optimizer = create_optimizer(config.clone()).unwrap();
            assert_eq!(optimizer.config(), &config);
        }
        assert!(create_optimizer(OptimizerConfig::Sgd { learning_rate: -1.0 }).is_err());
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let mut optimizer = create_optimizer(OptimizerConfig::default()).unwrap();
        let mut params = vec![0.0; 3];
        assert!(matches!(
            optimizer.apply_gradients(&mut params, &[1.0]),
            Err(OptimizerError::LengthMismatch { parameters: 3, gradients: 1 })
        ));
    }

    #[test]
    fn test_config_json_defaults() {
        let config: OptimizerConfig = serde_json::from_str(r#"{"type": "adam"}"#).unwrap();
        assert_eq!(config, OptimizerConfig::default());

        let config: OptimizerConfig =
            serde_json::from_str(r#"{"type": "sgd", "learning_rate": 0.5}"#).unwrap();
        assert_eq!(config, OptimizerConfig::Sgd { learning_rate: 0.5 });

        let json = serde_json::to_string(&OptimizerConfig::adagrad(0.01)).unwrap();
        assert!(json.contains(r#""type":"adagrad""#));
    }
}
