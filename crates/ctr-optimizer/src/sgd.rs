//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! # Example
//!
//! ```
//! use ctr_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let mut sgd = Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.01 }).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! sgd.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]).unwrap();
//! ```

use crate::{check_lengths, Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Plain gradient descent: `param = param - learning_rate * gradient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates a new SGD optimizer with the given learning rate.
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            config: OptimizerConfig::Sgd { learning_rate },
        }
    }
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Sgd { learning_rate } => Ok(Self {
                learning_rate,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) -> Result<(), OptimizerError> {
        check_lengths(params, gradients)?;
        for (p, g) in params.iter_mut().zip(gradients) {
            *p -= self.learning_rate * g;
        }
        Ok(())
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
