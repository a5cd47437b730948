//! Training hyperparameters.

use std::path::Path;

use ctr_optimizer::OptimizerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Hyperparameters for [`crate::Trainer`].
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```
/// use ctr_training::TrainConfig;
///
/// let config: TrainConfig = serde_json::from_str(r#"{"epochs": 2}"#).unwrap();
/// assert_eq!(config.epochs, 2);
/// assert_eq!(config.batch_size, 512);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Optimizer and its learning rate.
    pub optimizer: OptimizerConfig,
    /// Examples per step.
    pub batch_size: usize,
    /// Passes over the training data.
    pub epochs: usize,
    /// Fraction of the training data held out for validation, taken from
    /// the tail before shuffling.
    pub validation_split: f32,
    /// Seed for per-epoch shuffling.
    pub seed: u64,
    /// Log a step every this many steps; 0 disables step logging.
    pub log_interval: u64,
    /// Stop after this many epochs without a lower validation loss.
    pub early_stopping_patience: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::adam(0.001),
            batch_size: 512,
            epochs: 5,
            validation_split: 0.1,
            seed: 2020,
            log_interval: 100,
            early_stopping_patience: None,
        }
    }
}

impl TrainConfig {
    /// Loads a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Io`] or [`TrainingError::Parse`] when the file
    /// cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TrainingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| TrainingError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Learning rate of the configured optimizer.
    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }

    /// Replaces the optimizer's learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.optimizer = self.optimizer.with_learning_rate(learning_rate);
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the validation fraction.
    pub fn with_validation_split(mut self, validation_split: f32) -> Self {
        self.validation_split = validation_split;
        self
    }

    /// Sets the shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] for a zero batch size, a
    /// validation split outside `[0, 1)` or an invalid optimizer setting.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(TrainingError::InvalidConfig(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        self.optimizer.validate()?;
        Ok(())
    }
}
