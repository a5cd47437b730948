//! Adagrad optimizer.
//!
//! Adagrad scales each parameter's step by the inverse root of its
//! historical sum of squared gradients, so rarely-updated embedding rows
//! keep larger steps.
//!
//! # Example
//!
//! ```
//! use ctr_optimizer::{Optimizer, Adagrad, OptimizerConfig};
//!
//! let mut adagrad = Adagrad::new(OptimizerConfig::adagrad(0.01)).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! adagrad.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]).unwrap();
//! ```

use crate::{check_lengths, Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Adagrad optimizer with per-parameter adaptive learning rates.
///
/// ```text
/// accumulator = accumulator + g^2
/// param = param - learning_rate * g / (sqrt(accumulator) + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adagrad {
    learning_rate: f32,
    initial_accumulator: f32,
    epsilon: f32,
    accumulator: Vec<f32>,
    config: OptimizerConfig,
}

impl Adagrad {
    /// Returns the current accumulator state.
    pub fn accumulator(&self) -> &[f32] {
        &self.accumulator
    }
}

impl Optimizer for Adagrad {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adagrad {
                learning_rate,
                initial_accumulator,
                epsilon,
            } => Ok(Self {
                learning_rate,
                initial_accumulator,
                epsilon,
                accumulator: Vec::new(),
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adagrad".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) -> Result<(), OptimizerError> {
        check_lengths(params, gradients)?;
        if self.accumulator.len() != params.len() {
            self.accumulator = vec![self.initial_accumulator; params.len()];
        }

        for ((p, g), acc) in params
            .iter_mut()
            .zip(gradients)
            .zip(self.accumulator.iter_mut())
        {
            *acc += g * g;
            *p -= self.learning_rate * g / (acc.sqrt() + self.epsilon);
        }
        Ok(())
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn reset_state(&mut self) {
        self.accumulator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adagrad_update() {
        let mut adagrad = Adagrad::new(OptimizerConfig::Adagrad {
            learning_rate: 0.1,
            initial_accumulator: 0.0,
            epsilon: 0.0,
        })
        .unwrap();
        let mut params = vec![1.0];
        adagrad.apply_gradients(&mut params, &[2.0]).unwrap();
        // acc = 4, step = 0.1 * 2 / 2
        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((adagrad.accumulator()[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_adagrad_steps_shrink() {
        let mut adagrad = Adagrad::new(OptimizerConfig::adagrad(0.1)).unwrap();
        let mut params = vec![0.0];
        adagrad.apply_gradients(&mut params, &[1.0]).unwrap();
        let first = -params[0];
        adagrad.apply_gradients(&mut params, &[1.0]).unwrap();
        let second = -params[0] - first;
        assert!(second < first);
    }

    #[test]
    fn test_adagrad_reset() {
        let mut adagrad = Adagrad::new(OptimizerConfig::adagrad(0.1)).unwrap();
        let mut params = vec![0.0; 2];
        adagrad.apply_gradients(&mut params, &[1.0, 1.0]).unwrap();
        adagrad.reset_state();
        assert!(adagrad.accumulator().is_empty());
    }
}
