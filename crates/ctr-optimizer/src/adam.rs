//! Adam optimizer.
//!
//! Adam (Adaptive Moment Estimation) keeps exponential moving averages of
//! the gradients (first moment) and squared gradients (second moment).
//!
//! # Example
//!
//! ```
//! use ctr_optimizer::{Optimizer, Adam, OptimizerConfig};
//!
//! let mut adam = Adam::new(OptimizerConfig::adam(0.001)).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! adam.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]).unwrap();
//! ```

use crate::{check_lengths, Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Adam optimizer in the Keras formulation.
///
/// ```text
/// m = beta1 * m + (1 - beta1) * g
/// v = beta2 * v + (1 - beta2) * g^2
/// lr_t = lr * sqrt(1 - beta2^t) / (1 - beta1^t)
/// param = param - lr_t * m / (sqrt(v) + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates.
    m: Vec<f32>,
    /// Second moment estimates.
    v: Vec<f32>,
    /// Steps taken so far.
    t: u64,
    config: OptimizerConfig,
}

impl Adam {
    /// Returns the current first moment state.
    pub fn first_moment(&self) -> &[f32] {
        &self.m
    }

    /// Returns the current second moment state.
    pub fn second_moment(&self) -> &[f32] {
        &self.v
    }

    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Ok(Self {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                m: Vec::new(),
                v: Vec::new(),
                t: 0,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) -> Result<(), OptimizerError> {
        check_lengths(params, gradients)?;
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
        }

        self.t += 1;
        let t = self.t as f64;
        let lr_t = (f64::from(self.learning_rate) * (1.0 - f64::from(self.beta2).powf(t)).sqrt()
            / (1.0 - f64::from(self.beta1).powf(t))) as f32;

        for ((p, g), (m, v)) in params
            .iter_mut()
            .zip(gradients)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + self.epsilon);
        }
        Ok(())
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn reset_state(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(OptimizerConfig::adam(0.1)).unwrap();
        let mut params = vec![1.0, 2.0, -3.0];
        adam.apply_gradients(&mut params, &[0.5, -4.0, 1e3]).unwrap();

        // After bias correction the first step is lr * sign(g).
        assert!((params[0] - 0.9).abs() < 1e-4);
        assert!((params[1] - 2.1).abs() < 1e-4);
        assert!((params[2] + 3.1).abs() < 1e-4);
    }

    #[test]
    fn test_adam_timestep_and_state() {
        let mut adam = Adam::new(OptimizerConfig::default()).unwrap();
        let mut params = vec![1.0];
        assert_eq!(adam.timestep(), 0);
        adam.apply_gradients(&mut params, &[1.0]).unwrap();
        adam.apply_gradients(&mut params, &[1.0]).unwrap();
        assert_eq!(adam.timestep(), 2);
        assert!(adam.first_moment()[0] > 0.0);
        assert!(adam.second_moment()[0] > 0.0);

        adam.reset_state();
        assert_eq!(adam.timestep(), 0);
        assert!(adam.first_moment().is_empty());
    }

    #[test]
    fn test_adam_zero_gradient() {
        let mut adam = Adam::new(OptimizerConfig::default()).unwrap();
        let mut params = vec![1.0, 2.0];
        adam.apply_gradients(&mut params, &[0.0, 0.0]).unwrap();
        assert_eq!(params, vec![1.0, 2.0]);
    }

    #[test]
    fn test_adam_config_mismatch() {
        assert!(Adam::new(OptimizerConfig::Sgd { learning_rate: 0.01 }).is_err());
    }
}
