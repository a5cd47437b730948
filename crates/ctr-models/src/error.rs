//! Model construction and execution errors.

use ctr_layers::LayerError;
use thiserror::Error;

/// Errors returned by model builders and forward/backward passes.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A layer rejected its input or configuration.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// The model cannot be built for the given feature columns or settings.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// The dense input has the wrong width.
    #[error("expected {expected} dense features, got {actual}")]
    DenseWidth {
        /// Width the model was built for
        expected: usize,
        /// Width received
        actual: usize,
    },

    /// Dense and sparse inputs disagree on the batch size.
    #[error("dense batch has {dense} rows but sparse batch has {sparse}")]
    BatchMismatch {
        /// Dense rows
        dense: usize,
        /// Sparse rows
        sparse: usize,
    },

    /// A model name did not parse.
    #[error("unknown model '{0}', expected afm, deepfm or ffm")]
    UnknownModel(String),
}
