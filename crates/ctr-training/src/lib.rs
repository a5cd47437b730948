//! Training, evaluation and metrics for CTR models.
//!
//! - [`Trainer`] - shuffled mini-batch training with a tail validation split,
//!   evaluation and prediction
//! - [`TrainConfig`] - hyperparameters, loadable from JSON
//! - [`binary_cross_entropy`] and [`logit_gradient`] - the training loss
//! - [`auc`], [`Metrics`] and [`MetricsRecorder`] - evaluation metrics
//!
//! # Example
//!
//! ```
//! use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
//! use ctr_models::{build_model, ModelConfig, ModelKind};
//! use ctr_training::{TrainConfig, Trainer};
//!
//! let (columns, data) = synthetic_dataset(&SyntheticOptions::small(64)).unwrap();
//! let model = build_model(ModelKind::DeepFm, &columns, &ModelConfig::default(), 2020).unwrap();
//!
//! let mut trainer = Trainer::new(model, TrainConfig::default().with_batch_size(16)).unwrap();
//! let history = trainer.fit(&data).unwrap();
//! assert_eq!(history.len(), 5);
//!
//! let metrics = trainer.evaluate(&data).unwrap();
//! assert!(metrics.loss.is_finite());
//! ```

pub mod config;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod trainer;

pub use config::TrainConfig;
pub use error::{Result, TrainingError};
pub use loss::{binary_cross_entropy, logit_gradient};
pub use metrics::{accuracy, auc, Metrics, MetricsRecorder};
pub use trainer::{EarlyStopping, EpochSummary, History, Trainer};
