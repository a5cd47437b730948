//! Train command: fit a model on Criteo data and report the test AUC.
//!
//! Settings are layered: built-in defaults, then the `--config` file, then
//! any flag given on the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use ctr_layers::PoolingMode;
use ctr_models::{build_model, ModelConfig};
use ctr_optimizer::OptimizerConfig;
use ctr_training::{History, Metrics, TrainConfig, Trainer};
use tracing::{info, warn};

use crate::DataArgs;

/// AFM pair pooling, named as in the reference scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AfmModeArg {
    /// Sum over pairs
    Max,
    /// Mean over pairs
    Avg,
    /// Attention-weighted sum
    Att,
}

impl From<AfmModeArg> for PoolingMode {
    fn from(mode: AfmModeArg) -> Self {
        match mode {
            AfmModeArg::Max => PoolingMode::Sum,
            AfmModeArg::Avg => PoolingMode::Mean,
            AfmModeArg::Att => PoolingMode::Attention,
        }
    }
}

/// Optimizer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimizerArg {
    Sgd,
    Adagrad,
    Adam,
}

impl OptimizerArg {
    fn config(self, learning_rate: f32) -> OptimizerConfig {
        match self {
            OptimizerArg::Sgd => OptimizerConfig::Sgd { learning_rate },
            OptimizerArg::Adagrad => OptimizerConfig::adagrad(learning_rate),
            OptimizerArg::Adam => OptimizerConfig::adam(learning_rate),
        }
    }
}

/// Train a model and print `test AUC: <value>`.
///
/// # Example
///
/// ```bash
/// ctr train --model deepfm --data train.txt --epochs 2 --batch-size 1024
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub data: DataArgs,

    /// Learning rate [default: 0.001]
    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// Examples per step [default: 512]
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Passes over the training data [default: 5]
    #[arg(long, short = 'e')]
    pub epochs: Option<usize>,

    /// Fraction of training rows used for validation [default: 0.1]
    #[arg(long)]
    pub validation_split: Option<f32>,

    /// Optimizer [default: adam]
    #[arg(long, value_enum)]
    pub optimizer: Option<OptimizerArg>,

    /// Stop after this many epochs without a lower validation loss
    #[arg(long)]
    pub early_stopping: Option<usize>,

    /// AFM pair pooling [default: att]
    #[arg(long, value_enum)]
    pub afm_mode: Option<AfmModeArg>,

    /// Latent dimension of DeepFM and FFM [defaults: 10 and 8]
    #[arg(long)]
    pub k: Option<usize>,

    /// Write the per-epoch history to this JSON file
    #[arg(long)]
    pub history: Option<PathBuf>,
}

/// What a training run produced.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Per-epoch metrics
    pub history: History,
    /// Metrics on the test split
    pub test: Metrics,
}

impl TrainCommand {
    /// Execute the train command
    pub fn run(&self) -> Result<()> {
        let outcome = self.execute()?;
        match outcome.test.auc {
            Some(auc) => println!("test AUC: {auc:.6}"),
            None => {
                warn!("Test split holds a single class, AUC is undefined");
                println!("test AUC: nan");
            }
        }
        Ok(())
    }

    /// Loads data, trains and evaluates on the test split.
    pub fn execute(&self) -> Result<TrainOutcome> {
        let run_config = self.data.run_config()?;
        let seed = self.data.seed(&run_config);
        let train_config = self.train_config(run_config.train, seed);
        let model_config = self.model_config(run_config.model);

        let dataset = self.data.load(seed)?;
        let model = build_model(self.data.model, &dataset.feature_columns, &model_config, seed)
            .with_context(|| format!("Failed to build {}", self.data.model))?;
        info!(
            model = %self.data.model,
            params = model.summary().total_params(),
            optimizer = train_config.optimizer.name(),
            learning_rate = train_config.learning_rate(),
            "Training"
        );

        let mut trainer = Trainer::new(model, train_config).context("Invalid training settings")?;
        let history = trainer.fit(&dataset.train).context("Training failed")?;
        let test = trainer
            .evaluate(&dataset.test)
            .context("Evaluation on the test split failed")?;
        info!(loss = test.loss, auc = ?test.auc, "Test metrics");

        if let Some(path) = &self.history {
            let json = serde_json::to_string_pretty(&history)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write history to {}", path.display()))?;
        }
        Ok(TrainOutcome { history, test })
    }

    /// Applies the flags on top of the file's trainer settings.
    pub fn train_config(&self, mut config: TrainConfig, seed: u64) -> TrainConfig {
        if let Some(optimizer) = self.optimizer {
            config.optimizer = optimizer.config(config.learning_rate());
        }
        if let Some(learning_rate) = self.learning_rate {
            config = config.with_learning_rate(learning_rate);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(validation_split) = self.validation_split {
            config.validation_split = validation_split;
        }
        if self.early_stopping.is_some() {
            config.early_stopping_patience = self.early_stopping;
        }
        config.seed = seed;
        config
    }

    /// Applies the flags on top of the file's model settings.
    pub fn model_config(&self, mut config: ModelConfig) -> ModelConfig {
        if let Some(mode) = self.afm_mode {
            config.afm.mode = mode.into();
        }
        if let Some(k) = self.k {
            config.deepfm.k = k;
            config.ffm.k = k;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands, RunConfig};
    use clap::Parser;

    fn parse(args: &[&str]) -> TrainCommand {
        let mut argv = vec!["ctr", "train"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Train(cmd) => cmd,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_match_reference_script() {
        let cmd = parse(&["--model", "ffm", "--synthetic", "10"]);
        let config = cmd.train_config(TrainConfig::default(), 2020);
        assert_eq!(config, TrainConfig::default());
        assert_eq!(cmd.model_config(ModelConfig::default()), ModelConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let cmd = parse(&[
            "--model",
            "afm",
            "--synthetic",
            "10",
            "--learning-rate",
            "0.05",
            "--optimizer",
            "adagrad",
            "--epochs",
            "2",
            "--afm-mode",
            "avg",
            "--k",
            "4",
        ]);
        let file = TrainConfig::default().with_batch_size(64).with_epochs(9);
        let config = cmd.train_config(file, 3);
        assert_eq!(config.optimizer.name(), "Adagrad");
        assert!((config.learning_rate() - 0.05).abs() < 1e-9);
        assert_eq!(config.epochs, 2);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.seed, 3);

        let model = cmd.model_config(ModelConfig::default());
        assert_eq!(model.afm.mode, PoolingMode::Mean);
        assert_eq!((model.deepfm.k, model.ffm.k), (4, 4));
    }

    #[test]
    fn test_optimizer_keeps_file_learning_rate() {
        let cmd = parse(&["--model", "ffm", "--synthetic", "10", "--optimizer", "sgd"]);
        let config = cmd.train_config(TrainConfig::default().with_learning_rate(0.3), 1);
        assert_eq!(config.optimizer, OptimizerConfig::Sgd { learning_rate: 0.3 });
    }

    #[test]
    fn test_afm_mode_names() {
        assert_eq!(PoolingMode::from(AfmModeArg::Max), PoolingMode::Sum);
        assert_eq!(PoolingMode::from(AfmModeArg::Att), PoolingMode::Attention);
        assert!(Cli::try_parse_from([
            "ctr",
            "train",
            "--model",
            "afm",
            "--synthetic",
            "5",
            "--afm-mode",
            "min"
        ])
        .is_err());
    }

    #[test]
    fn test_seed_falls_back_to_file() {
        let cmd = parse(&["--model", "ffm", "--synthetic", "10"]);
        let run_config = RunConfig {
            train: TrainConfig::default().with_seed(77),
            ..RunConfig::default()
        };
        assert_eq!(cmd.data.seed(&run_config), 77);
        let cmd = parse(&["--model", "ffm", "--synthetic", "10", "--seed", "5"]);
        assert_eq!(cmd.data.seed(&run_config), 5);
    }
}
