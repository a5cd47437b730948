//! Mini-batches of CTR examples.
//!
//! A [`CtrBatch`] holds the dense matrix, sparse id matrix and labels for a
//! contiguous group of rows. [`Batches`] walks a [`Dataset`] in a fixed row
//! order and gathers one batch per step.
//!
//! # Example
//!
//! ```
//! use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
//!
//! let (_, dataset) = synthetic_dataset(&SyntheticOptions::small(10)).unwrap();
//! let sizes: Vec<usize> = dataset.batches(4).unwrap().map(|b| b.len()).collect();
//! assert_eq!(sizes, vec![4, 4, 2]);
//! ```

use ctr_layers::{IndexTensor, Tensor};

use crate::dataset::Dataset;

/// One mini-batch.
#[derive(Debug, Clone)]
pub struct CtrBatch {
    /// Dense features, `[batch, D]`
    pub dense: Tensor,
    /// Sparse ids, `[batch, S]`
    pub sparse: IndexTensor,
    /// Click labels (0 or 1)
    pub labels: Vec<f32>,
}

impl CtrBatch {
    /// Returns the number of examples in this batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if this batch contains no examples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels as a `[batch, 1]` tensor.
    pub fn labels_tensor(&self) -> Tensor {
        Tensor::from_data(&[self.labels.len(), 1], self.labels.clone())
    }
}

/// Iterator over the batches of a dataset in a given row order.
///
/// The last batch is smaller when the row count is not a multiple of the
/// batch size.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl<'a> Batches<'a> {
    pub(crate) fn new(dataset: &'a Dataset, order: Vec<usize>, batch_size: usize) -> Self {
        Self {
            dataset,
            order,
            batch_size,
            position: 0,
        }
    }

    /// Number of batches this iterator yields in total.
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }
}

impl Iterator for Batches<'_> {
    type Item = CtrBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let rows = &self.order[self.position..end];
        self.position = end;
        Some(self.dataset.gather(rows))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
