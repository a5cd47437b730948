//! Model hyperparameters.
//!
//! Every field has a default matching the reference training scripts, so a
//! partial JSON file such as `{"afm": {"mode": "avg"}}` is a valid
//! [`ModelConfig`].

use std::fmt;
use std::str::FromStr;

use ctr_layers::{ActivationType, PoolingMode};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Which model to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Attentional Factorization Machine
    Afm,
    /// DeepFM
    DeepFm,
    /// Field-aware Factorization Machine
    Ffm,
}

impl ModelKind {
    /// All kinds, in display order.
    pub const ALL: [ModelKind; 3] = [ModelKind::Afm, ModelKind::DeepFm, ModelKind::Ffm];
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "afm" => Ok(ModelKind::Afm),
            "deepfm" => Ok(ModelKind::DeepFm),
            "ffm" => Ok(ModelKind::Ffm),
            _ => Err(ModelError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Afm => "afm",
            ModelKind::DeepFm => "deepfm",
            ModelKind::Ffm => "ffm",
        })
    }
}

/// AFM hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfmConfig {
    /// Pair pooling policy
    pub mode: PoolingMode,
    /// Width of the attention network
    pub att_vector: usize,
    /// Activation of the attention network
    pub activation: ActivationType,
    /// Dropout on the pooled vector
    pub dropout: f32,
    /// L2 coefficient on every embedding table
    pub embed_reg: f32,
}

impl Default for AfmConfig {
    fn default() -> Self {
        Self {
            mode: PoolingMode::Attention,
            att_vector: 8,
            activation: ActivationType::ReLU,
            dropout: 0.0,
            embed_reg: 1e-4,
        }
    }
}

/// DeepFM hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepFmConfig {
    /// FM latent size
    pub k: usize,
    /// DNN hidden widths
    pub hidden_units: Vec<usize>,
    /// Dropout after the last hidden layer
    pub dnn_dropout: f32,
    /// DNN activation
    pub activation: ActivationType,
    /// L2 coefficient on the FM linear weights
    pub fm_w_reg: f32,
    /// L2 coefficient on the FM factors
    pub fm_v_reg: f32,
    /// L2 coefficient on every embedding table
    pub embed_reg: f32,
}

impl Default for DeepFmConfig {
    fn default() -> Self {
        Self {
            k: 10,
            hidden_units: vec![200, 200, 200],
            dnn_dropout: 0.0,
            activation: ActivationType::ReLU,
            fm_w_reg: 1e-4,
            fm_v_reg: 1e-4,
            embed_reg: 1e-4,
        }
    }
}

/// FFM hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmConfig {
    /// Latent size
    pub k: usize,
    /// L2 coefficient on the linear weights
    pub w_reg: f32,
    /// L2 coefficient on the latent vectors
    pub v_reg: f32,
}

impl Default for FfmConfig {
    fn default() -> Self {
        Self {
            k: 8,
            w_reg: 1e-4,
            v_reg: 1e-4,
        }
    }
}

/// Hyperparameters for all three models; only the section matching the
/// built [`ModelKind`] is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// AFM section
    pub afm: AfmConfig,
    /// DeepFM section
    pub deepfm: DeepFmConfig,
    /// FFM section
    pub ffm: FfmConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("AFM".parse::<ModelKind>().unwrap(), ModelKind::Afm);
        assert_eq!("deepfm".parse::<ModelKind>().unwrap(), ModelKind::DeepFm);
        assert_eq!(ModelKind::Ffm.to_string(), "ffm");
        assert!(matches!(
            "wide_deep".parse::<ModelKind>(),
            Err(ModelError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"afm": {"mode": "avg"}, "ffm": {"k": 4}}"#).unwrap();
        assert_eq!(config.afm.mode, PoolingMode::Mean);
        assert_eq!(config.afm.att_vector, 8);
        assert_eq!(config.ffm.k, 4);
        assert_eq!(config.deepfm, DeepFmConfig::default());
    }
}
