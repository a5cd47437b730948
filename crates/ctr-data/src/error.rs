//! Error type for dataset loading and batching.

use std::path::PathBuf;

use ctr_layers::LayerError;
use thiserror::Error;

/// Errors raised while reading, preprocessing or batching data.
#[derive(Debug, Error)]
pub enum DataError {
    /// The input file could not be opened or read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A row had the wrong number of tab-separated columns.
    #[error("line {line}: expected {expected} columns, found {actual}")]
    ColumnCount {
        /// 1-based line number
        line: usize,
        /// Expected column count
        expected: usize,
        /// Column count found
        actual: usize,
    },

    /// A dense column held a non-numeric value.
    #[error("line {line}: column {column} has non-numeric value '{value}'")]
    InvalidDense {
        /// 1-based line number
        line: usize,
        /// Column name
        column: String,
        /// Raw text
        value: String,
    },

    /// The label column was not 0 or 1.
    #[error("line {line}: label must be 0 or 1, got '{value}'")]
    InvalidLabel {
        /// 1-based line number
        line: usize,
        /// Raw text
        value: String,
    },

    /// The input held no data rows.
    #[error("dataset is empty")]
    Empty,

    /// An option or argument was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor construction failed.
    #[error(transparent)]
    Layer(#[from] LayerError),
}
