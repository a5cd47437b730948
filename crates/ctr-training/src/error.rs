//! Error type for training operations.

use std::path::PathBuf;

use ctr_data::DataError;
use ctr_layers::LayerError;
use ctr_models::ModelError;
use ctr_optimizer::OptimizerError;
use thiserror::Error;

/// Errors that can occur while training or evaluating a model.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The model rejected its inputs or a backward pass failed.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Splitting or batching the dataset failed.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// An optimizer could not be created or applied.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// A tensor operation failed.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// A hyperparameter is out of range.
    #[error("Invalid training config: {0}")]
    InvalidConfig(String),

    /// The backward pass left a parameter without a gradient.
    #[error("Missing gradient for parameter {index}")]
    MissingGradient {
        /// Position in the model's parameter list
        index: usize,
    },

    /// Probabilities and labels differ in length.
    #[error("Got {predictions} predictions for {labels} labels")]
    LengthMismatch {
        /// Number of predictions
        predictions: usize,
        /// Number of labels
        labels: usize,
    },

    /// Reading a config file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid JSON for the expected type.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;
