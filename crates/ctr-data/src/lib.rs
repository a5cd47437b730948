//! Data loading, preprocessing and batching for CTR models.
//!
//! This crate turns raw click logs into the `(dense, sparse, label)` rows the
//! models consume.
//!
//! # Modules
//!
//! - [`feature_column`] - dense and sparse feature descriptions
//! - [`criteo`] - Criteo TSV loader with label encoding and min-max scaling
//! - [`dataset`] - in-memory [`Dataset`] with train/test and validation splits
//! - [`batch`] - [`CtrBatch`] and the batch iterator
//! - [`synthetic`] - seeded generated datasets
//!
//! # Example
//!
//! ```
//! use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
//! use rand::SeedableRng;
//!
//! let (columns, dataset) = synthetic_dataset(&SyntheticOptions::small(50)).unwrap();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let (train, test) = dataset.train_test_split(0.2, &mut rng).unwrap();
//! assert_eq!(test.len(), 10);
//!
//! for batch in train.shuffled_batches(16, &mut rng).unwrap() {
//!     assert_eq!(batch.sparse.num_fields(), columns.num_sparse());
//! }
//! ```

pub mod batch;
pub mod criteo;
pub mod dataset;
pub mod error;
pub mod feature_column;
pub mod synthetic;

pub use batch::{Batches, CtrBatch};
pub use criteo::{create_criteo_dataset, parse_criteo, CriteoDataset, CriteoOptions};
pub use dataset::Dataset;
pub use error::DataError;
pub use feature_column::{DenseFeature, FeatureColumns, SparseFeature};
pub use synthetic::{synthetic_dataset, SyntheticOptions};
