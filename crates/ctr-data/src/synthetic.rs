//! Seeded synthetic CTR data for tests and smoke runs.
//!
//! Labels come from a hidden logistic rule over the dense values and one
//! random weight per sparse id, thresholded at the median score so both
//! classes are present.

use ctr_layers::{IndexTensor, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::DataError;
use crate::feature_column::{DenseFeature, FeatureColumns, SparseFeature};

/// Shape of the generated data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticOptions {
    /// Number of rows
    pub num_samples: usize,
    /// Number of dense features
    pub num_dense: usize,
    /// Cardinality of each sparse feature
    pub feat_nums: Vec<usize>,
    /// Embedding width of every sparse feature
    pub embed_dim: usize,
    /// RNG seed
    pub seed: u64,
}

impl SyntheticOptions {
    /// Two dense and two sparse features of cardinality 3.
    pub fn small(num_samples: usize) -> Self {
        Self {
            num_samples,
            num_dense: 2,
            feat_nums: vec![3, 3],
            embed_dim: 4,
            seed: 42,
        }
    }

    /// Criteo layout (13 dense, 26 sparse) with small vocabularies.
    pub fn criteo_like(num_samples: usize, embed_dim: usize, seed: u64) -> Self {
        Self {
            num_samples,
            num_dense: 13,
            feat_nums: vec![10; 26],
            embed_dim,
            seed,
        }
    }
}

/// Generates feature columns and a dataset.
///
/// # Errors
///
/// Returns [`DataError::InvalidConfig`] if there are no rows or a sparse
/// cardinality is zero.
pub fn synthetic_dataset(options: &SyntheticOptions) -> Result<(FeatureColumns, Dataset), DataError> {
    if options.num_samples == 0 {
        return Err(DataError::InvalidConfig(
            "num_samples must be positive".to_string(),
        ));
    }
    let columns = FeatureColumns::new(
        (0..options.num_dense)
            .map(|i| DenseFeature::new(format!("I{}", i + 1)))
            .collect(),
        options
            .feat_nums
            .iter()
            .enumerate()
            .map(|(j, &n)| SparseFeature::new(format!("C{}", j + 1), n, options.embed_dim))
            .collect(),
    )?;

    let mut rng = StdRng::seed_from_u64(options.seed);
    let dense_coef: Vec<f32> = (0..options.num_dense)
        .map(|_| rng.gen_range(-2.0..2.0))
        .collect();
    let id_weights: Vec<Vec<f32>> = options
        .feat_nums
        .iter()
        .map(|&n| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    let rows = options.num_samples;
    let num_sparse = options.feat_nums.len();
    let mut dense = Vec::with_capacity(rows * options.num_dense);
    let mut sparse = Vec::with_capacity(rows * num_sparse);
    let mut scores = Vec::with_capacity(rows);

    for _ in 0..rows {
        let mut score = 0.0f32;
        for coef in &dense_coef {
            let x: f32 = rng.gen();
            score += coef * x;
            dense.push(x);
        }
        for weights in &id_weights {
            let id = rng.gen_range(0..weights.len());
            score += weights[id];
            sparse.push(id);
        }
        scores.push(score);
    }

    let mut sorted = scores.clone();
    sorted.sort_by(f32::total_cmp);
    let median = sorted[rows / 2];
    let labels = scores
        .iter()
        .map(|&s| if s >= median { 1.0 } else { 0.0 })
        .collect();

    let dataset = Dataset::new(
        Tensor::from_data(&[rows, options.num_dense], dense),
        IndexTensor::new(rows, num_sparse, sparse)?,
        labels,
    )?;
    Ok((columns, dataset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_dataset_shape() {
        let (columns, dataset) = synthetic_dataset(&SyntheticOptions::small(4)).unwrap();
        assert_eq!(columns.num_dense(), 2);
        assert_eq!(columns.feat_nums(), vec![3, 3]);
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.dense().shape(), &[4, 2]);
        assert!(dataset.sparse().data().iter().all(|&id| id < 3));
    }

    #[test]
    fn test_both_classes_present() {
        let (_, dataset) = synthetic_dataset(&SyntheticOptions::small(100)).unwrap();
        let positives = dataset.labels().iter().filter(|&&y| y == 1.0).count();
        assert!(positives > 0 && positives < 100);
    }

    #[test]
    fn test_seed_determinism() {
        let options = SyntheticOptions::criteo_like(16, 4, 9);
        let (_, a) = synthetic_dataset(&options).unwrap();
        let (_, b) = synthetic_dataset(&options).unwrap();
        assert_eq!(a.dense().data(), b.dense().data());
        assert_eq!(a.sparse().data(), b.sparse().data());
        assert_eq!(a.labels(), b.labels());
    }
}
