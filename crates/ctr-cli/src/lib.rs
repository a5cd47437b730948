//! Command-line interface for the CTR models.
//!
//! - **train**: load Criteo data (or generate it), train AFM, DeepFM or FFM
//!   and report the test AUC
//! - **inspect**: build a model for the data and print its parameters
//!
//! # Example
//!
//! ```bash
//! # FFM with the reference hyperparameters
//! ctr train --model ffm --data dataset/Criteo/train.txt
//!
//! # AFM with mean pooling on generated data
//! ctr train --model afm --synthetic 2000 --afm-mode avg --epochs 2
//!
//! # Parameter listing
//! ctr inspect --model deepfm --data dataset/Criteo/train.txt
//! ```

pub mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ctr_data::synthetic::{synthetic_dataset, SyntheticOptions};
use ctr_data::{create_criteo_dataset, CriteoDataset, CriteoOptions};
use ctr_models::{ModelConfig, ModelKind};
use ctr_training::TrainConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub use commands::{InspectCommand, TrainCommand};

/// Train and inspect click-through-rate models.
#[derive(Parser, Debug)]
#[command(name = "ctr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model and report its test AUC
    Train(TrainCommand),

    /// Build a model and print its parameter summary
    Inspect(InspectCommand),
}

/// Contents of a `--config` file.
///
/// Both sections are optional and partial:
///
/// ```json
/// { "train": { "epochs": 3 }, "model": { "afm": { "mode": "avg" } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Trainer settings
    pub train: TrainConfig,
    /// Model hyperparameters
    pub model: ModelConfig,
}

impl RunConfig {
    /// Reads a JSON run config.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Data and model selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Model to build
    #[arg(long, short = 'm')]
    pub model: ModelKind,

    /// Criteo-format TSV file (label, I1..I13, C1..C26)
    #[arg(
        long,
        short = 'd',
        env = "CTR_DATA",
        required_unless_present = "synthetic",
        conflicts_with = "synthetic"
    )]
    pub data: Option<PathBuf>,

    /// Generate this many Criteo-shaped rows instead of reading a file
    #[arg(long, value_name = "N")]
    pub synthetic: Option<usize>,

    /// JSON file with optional `train` and `model` sections; flags override it
    #[arg(long, short = 'c', env = "CTR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Rows to read from the data file
    #[arg(long, default_value_t = 100_000)]
    pub sample_num: usize,

    /// Read the whole data file instead of the first `--sample-num` rows
    #[arg(long)]
    pub read_all: bool,

    /// Fraction of rows held out for testing
    #[arg(long, default_value_t = 0.2)]
    pub test_size: f32,

    /// Embedding width of every categorical feature
    #[arg(long, default_value_t = 8)]
    pub embed_dim: usize,

    /// Seed for the data split, parameter initialization and shuffling
    /// [default: the config file's train.seed, else 2020]
    #[arg(long)]
    pub seed: Option<u64>,
}

impl DataArgs {
    /// The `--config` file, or defaults when none was given.
    pub fn run_config(&self) -> Result<RunConfig> {
        match &self.config {
            Some(path) => RunConfig::from_json_file(path),
            None => Ok(RunConfig::default()),
        }
    }

    /// Seed from the flag, falling back to the config file.
    pub fn seed(&self, run_config: &RunConfig) -> u64 {
        self.seed.unwrap_or(run_config.train.seed)
    }

    /// Loader options built from the flags.
    pub fn criteo_options(&self, seed: u64) -> CriteoOptions {
        CriteoOptions {
            embed_dim: self.embed_dim,
            read_part: !self.read_all,
            sample_num: self.sample_num,
            test_size: self.test_size,
            seed,
        }
    }

    /// Loads and splits the data file, or generates data for `--synthetic`.
    pub fn load(&self, seed: u64) -> Result<CriteoDataset> {
        let options = self.criteo_options(seed);
        if let Some(rows) = self.synthetic {
            let (feature_columns, dataset) =
                synthetic_dataset(&SyntheticOptions::criteo_like(rows, self.embed_dim, seed))
                    .context("Failed to generate synthetic data")?;
            let mut rng = StdRng::seed_from_u64(seed);
            let (train, test) = dataset
                .train_test_split(options.test_size, &mut rng)
                .context("Failed to split synthetic data")?;
            tracing::info!(train = train.len(), test = test.len(), "Generated synthetic dataset");
            return Ok(CriteoDataset {
                feature_columns,
                train,
                test,
            });
        }

        let path = self
            .data
            .as_ref()
            .context("Either --data or --synthetic is required")?;
        create_criteo_dataset(path, &options)
            .with_context(|| format!("Failed to load Criteo data from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_defaults() {
        let cli = Cli::try_parse_from(["ctr", "train", "--model", "ffm", "--data", "train.txt"]).unwrap();
        let Commands::Train(cmd) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(cmd.data.model, ModelKind::Ffm);
        assert_eq!(cmd.data.data, Some(PathBuf::from("train.txt")));
        assert_eq!(cmd.data.sample_num, 100_000);
        assert!(!cmd.data.read_all);
        assert_eq!(cmd.data.embed_dim, 8);
        assert!((cmd.data.test_size - 0.2).abs() < 1e-9);
        assert_eq!(cmd.data.seed(&RunConfig::default()), 2020);
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["ctr", "inspect", "-m", "deepfm", "--synthetic", "10"]).unwrap();
        let Commands::Inspect(cmd) = cli.command else {
            panic!("expected inspect");
        };
        assert_eq!(cmd.data.model, ModelKind::DeepFm);
        assert_eq!(cmd.data.synthetic, Some(10));
    }

    #[test]
    fn test_data_source_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["ctr", "train", "--model", "afm"]).is_err());
        assert!(Cli::try_parse_from([
            "ctr",
            "train",
            "--model",
            "afm",
            "--data",
            "x.txt",
            "--synthetic",
            "5"
        ])
        .is_err());
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        assert!(Cli::try_parse_from(["ctr", "train", "--model", "lr", "--synthetic", "5"]).is_err());
    }

    #[test]
    fn test_criteo_options_from_flags() {
        let cli = Cli::try_parse_from([
            "ctr",
            "inspect",
            "--model",
            "ffm",
            "--data",
            "x.txt",
            "--read-all",
            "--sample-num",
            "10",
            "--embed-dim",
            "4",
        ])
        .unwrap();
        let Commands::Inspect(cmd) = cli.command else {
            panic!("expected inspect");
        };
        let options = cmd.data.criteo_options(1);
        assert!(!options.read_part);
        assert_eq!(options.sample_num, 10);
        assert_eq!(options.embed_dim, 4);
        assert_eq!(options.seed, 1);
    }

    #[test]
    fn test_run_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"train": {"epochs": 3, "seed": 9}, "model": {"ffm": {"k": 4}}}"#,
        )
        .unwrap();
        let config = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(config.train.epochs, 3);
        assert_eq!(config.model.ffm.k, 4);
        assert_eq!(config.model.deepfm.k, 10);

        std::fs::write(&path, "[]").unwrap();
        assert!(RunConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_synthetic_load_is_split() {
        let cli = Cli::try_parse_from(["ctr", "inspect", "--model", "afm", "--synthetic", "50"]).unwrap();
        let Commands::Inspect(cmd) = cli.command else {
            panic!("expected inspect");
        };
        let data = cmd.data.load(2020).unwrap();
        assert_eq!(data.test.len(), 10);
        assert_eq!(data.train.len(), 40);
        assert_eq!(data.feature_columns.num_sparse(), 26);
    }
}
