//! Feature column descriptions shared by the loaders and the models.
//!
//! A [`FeatureColumns`] value tells a model how many dense inputs it receives
//! and, for each sparse input, the vocabulary size and embedding width.

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A numeric feature of dimensionality 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseFeature {
    /// Column name
    pub name: String,
}

impl DenseFeature {
    /// Creates a dense feature.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A categorical feature backed by an embedding table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseFeature {
    /// Column name
    pub name: String,
    /// Cardinality; valid ids are `0..feat_num`
    pub feat_num: usize,
    /// Embedding width
    pub embed_dim: usize,
}

impl SparseFeature {
    /// Creates a sparse feature.
    pub fn new(name: impl Into<String>, feat_num: usize, embed_dim: usize) -> Self {
        Self {
            name: name.into(),
            feat_num,
            embed_dim,
        }
    }
}

/// Dense and sparse feature descriptions, in input column order.
///
/// # Example
///
/// ```
/// use ctr_data::{DenseFeature, FeatureColumns, SparseFeature};
///
/// let columns = FeatureColumns::new(
///     vec![DenseFeature::new("I1")],
///     vec![SparseFeature::new("C1", 10, 4), SparseFeature::new("C2", 3, 4)],
/// )
/// .unwrap();
/// assert_eq!(columns.feat_nums(), vec![10, 3]);
/// assert_eq!(columns.uniform_embed_dim(), Some(4));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumns {
    dense: Vec<DenseFeature>,
    sparse: Vec<SparseFeature>,
}

impl FeatureColumns {
    /// Creates the column set.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if a sparse feature has zero
    /// cardinality or zero embedding width.
    pub fn new(dense: Vec<DenseFeature>, sparse: Vec<SparseFeature>) -> Result<Self, DataError> {
        for feature in &sparse {
            if feature.feat_num == 0 || feature.embed_dim == 0 {
                return Err(DataError::InvalidConfig(format!(
                    "sparse feature '{}' needs feat_num > 0 and embed_dim > 0",
                    feature.name
                )));
            }
        }
        Ok(Self { dense, sparse })
    }

    /// Dense features.
    pub fn dense(&self) -> &[DenseFeature] {
        &self.dense
    }

    /// Sparse features.
    pub fn sparse(&self) -> &[SparseFeature] {
        &self.sparse
    }

    /// Number of dense features.
    pub fn num_dense(&self) -> usize {
        self.dense.len()
    }

    /// Number of sparse features.
    pub fn num_sparse(&self) -> usize {
        self.sparse.len()
    }

    /// Cardinality of each sparse feature.
    pub fn feat_nums(&self) -> Vec<usize> {
        self.sparse.iter().map(|f| f.feat_num).collect()
    }

    /// `(feat_num, embed_dim)` per sparse feature.
    pub fn embedding_shapes(&self) -> Vec<(usize, usize)> {
        self.sparse.iter().map(|f| (f.feat_num, f.embed_dim)).collect()
    }

    /// Shared embedding width, if all sparse features agree.
    pub fn uniform_embed_dim(&self) -> Option<usize> {
        let first = self.sparse.first()?.embed_dim;
        self.sparse
            .iter()
            .all(|f| f.embed_dim == first)
            .then_some(first)
    }
}
