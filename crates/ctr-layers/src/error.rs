//! Error types for the ctr-layers crate.
//!
//! Shape mismatches, bad configurations, out-of-range embedding ids and
//! backward passes without a preceding training forward pass all surface as
//! [`LayerError`].

use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Invalid input dimension for the layer.
    #[error("Invalid input dimension: expected {expected}, got {actual}")]
    InvalidInputDimension {
        /// The expected input dimension
        expected: usize,
        /// The actual input dimension
        actual: usize,
    },

    /// Error during forward pass computation.
    #[error("Forward pass error: {message}")]
    ForwardError {
        /// Description of the forward pass error
        message: String,
    },

    /// Layer has not been run in training mode before backward.
    #[error("Layer not initialized: forward_train must be called before backward")]
    NotInitialized,

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// A sparse id does not fit the embedding table it is looked up in.
    #[error("Embedding index {index} out of range for table with {num_embeddings} rows")]
    IndexOutOfRange {
        /// The offending id
        index: usize,
        /// Number of rows in the table
        num_embeddings: usize,
    },
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
