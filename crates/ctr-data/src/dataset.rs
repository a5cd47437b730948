//! In-memory CTR dataset.
//!
//! [`Dataset`] stores every row as a dense matrix, a sparse id matrix and a
//! label vector. It supports the splits used by the training driver and
//! produces ordered or shuffled mini-batches.

use ctr_layers::{IndexTensor, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::batch::{Batches, CtrBatch};
use crate::error::DataError;

/// Rows of dense features, sparse ids and labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    dense: Tensor,
    sparse: IndexTensor,
    labels: Vec<f32>,
}

impl Dataset {
    /// Creates a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `dense` is not 2-D or the row
    /// counts of the three parts differ.
    pub fn new(dense: Tensor, sparse: IndexTensor, labels: Vec<f32>) -> Result<Self, DataError> {
        if dense.ndim() != 2 {
            return Err(DataError::InvalidConfig(format!(
                "dense features must be 2-D, got shape {:?}",
                dense.shape()
            )));
        }
        if dense.shape()[0] != labels.len() || sparse.batch_size() != labels.len() {
            return Err(DataError::InvalidConfig(format!(
                "row counts differ: dense {}, sparse {}, labels {}",
                dense.shape()[0],
                sparse.batch_size(),
                labels.len()
            )));
        }
        Ok(Self {
            dense,
            sparse,
            labels,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Dense features, `[rows, D]`.
    pub fn dense(&self) -> &Tensor {
        &self.dense
    }

    /// Sparse ids, `[rows, S]`.
    pub fn sparse(&self) -> &IndexTensor {
        &self.sparse
    }

    /// Labels.
    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Fraction of positive labels.
    pub fn positive_rate(&self) -> f32 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().sum::<f32>() / self.labels.len() as f32
    }

    /// Gathers the given rows into a batch.
    pub fn gather(&self, rows: &[usize]) -> CtrBatch {
        CtrBatch {
            dense: self.dense.select_rows(rows),
            sparse: self.sparse.select_rows(rows),
            labels: rows.iter().map(|&r| self.labels[r]).collect(),
        }
    }

    /// Returns a new dataset made of the given rows, in order.
    pub fn select(&self, rows: &[usize]) -> Dataset {
        let batch = self.gather(rows);
        Dataset {
            dense: batch.dense,
            sparse: batch.sparse,
            labels: batch.labels,
        }
    }

    /// Splits off the last `fraction` of rows.
    ///
    /// Returns `(head, tail)` where `head` holds the first
    /// `floor(len * (1 - fraction))` rows, matching a Keras
    /// `validation_split`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `fraction` is outside `[0, 1)`.
    pub fn split_tail(&self, fraction: f32) -> Result<(Dataset, Dataset), DataError> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(DataError::InvalidConfig(format!(
                "split fraction must be in [0, 1), got {fraction}"
            )));
        }
        let split_at = (self.len() as f64 * (1.0 - decimal_fraction(fraction))) as usize;
        let head: Vec<usize> = (0..split_at).collect();
        let tail: Vec<usize> = (split_at..self.len()).collect();
        Ok((self.select(&head), self.select(&tail)))
    }

    /// Shuffles the rows with `rng` and splits them into `(train, test)`.
    ///
    /// The test part receives `ceil(len * test_size)` rows.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `test_size` is outside `(0, 1)`.
    pub fn train_test_split<R: Rng + ?Sized>(
        &self,
        test_size: f32,
        rng: &mut R,
    ) -> Result<(Dataset, Dataset), DataError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DataError::InvalidConfig(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        let n_test = (self.len() as f64 * decimal_fraction(test_size)).ceil() as usize;
        let (test, train) = order.split_at(n_test.min(self.len()));
        Ok((self.select(train), self.select(test)))
    }

    /// Batches in row order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `batch_size` is zero.
    pub fn batches(&self, batch_size: usize) -> Result<Batches<'_>, DataError> {
        check_batch_size(batch_size)?;
        Ok(Batches::new(self, (0..self.len()).collect(), batch_size))
    }

    /// Batches over a fresh random permutation of the rows.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `batch_size` is zero.
    pub fn shuffled_batches<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Batches<'_>, DataError> {
        check_batch_size(batch_size)?;
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        Ok(Batches::new(self, order, batch_size))
    }
}

/// Widens a fraction to the `f64` nearest its decimal value, so `0.2f32`
/// becomes `0.2` rather than `0.20000000298...` before rows are counted.
fn decimal_fraction(fraction: f32) -> f64 {
    (f64::from(fraction) * 1e6).round() / 1e6
}

fn check_batch_size(batch_size: usize) -> Result<(), DataError> {
    if batch_size == 0 {
        return Err(DataError::InvalidConfig(
            "batch_size must be positive".to_string(),
        ));
    }
    Ok(())
}
