//! CTR prediction models: AFM, DeepFM and FFM.
//!
//! Every model implements [`CtrModel`], maps `(dense [B, D], sparse [B, S])`
//! to click probabilities `[B, 1]` and trains through hand-derived backward
//! passes over the layers in `ctr_layers`.
//!
//! - [`Afm`] - pairwise embedding products pooled by sum, mean or attention
//! - [`DeepFm`] - a factorization machine plus a feed-forward network
//! - [`Ffm`] - field-aware factorization machine
//!
//! Use [`build_model`] to construct any of them from [`FeatureColumns`]
//! and a [`ModelConfig`].
//!
//! [`FeatureColumns`]: ctr_data::FeatureColumns

pub mod afm;
pub mod config;
pub mod deepfm;
pub mod error;
pub mod ffm;
pub mod model;
pub mod summary;

pub use afm::Afm;
pub use config::{AfmConfig, DeepFmConfig, FfmConfig, ModelConfig, ModelKind};
pub use deepfm::DeepFm;
pub use error::ModelError;
pub use ffm::Ffm;
pub use model::{build_model, CtrModel};
pub use summary::{ModelSummary, ParameterSummary};
