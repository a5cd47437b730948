//! Inspect command: print the parameters a model would train.

use anyhow::{Context, Result};
use clap::Args;
use ctr_models::build_model;

use crate::DataArgs;

/// Build a model for the data's feature columns and print its summary.
///
/// # Example
///
/// ```bash
/// ctr inspect --model ffm --data train.txt --sample-num 1000
/// ```
#[derive(Args, Debug, Clone)]
pub struct InspectCommand {
    #[command(flatten)]
    pub data: DataArgs,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl InspectCommand {
    /// Execute the inspect command
    pub fn run(&self) -> Result<()> {
        println!("{}", self.render()?);
        Ok(())
    }

    /// The text `run` prints.
    pub fn render(&self) -> Result<String> {
        let run_config = self.data.run_config()?;
        let seed = self.data.seed(&run_config);
        let dataset = self.data.load(seed)?;
        let columns = &dataset.feature_columns;

        let model = build_model(self.data.model, columns, &run_config.model, seed)
            .with_context(|| format!("Failed to build {}", self.data.model))?;
        let summary = model.summary();
        tracing::info!(
            model = %self.data.model,
            dense = columns.num_dense(),
            sparse = columns.num_sparse(),
            params = summary.total_params(),
            "Built model"
        );

        if self.json {
            return serde_json::to_string_pretty(&summary).context("Failed to serialize summary");
        }
        Ok(summary.to_string())
    }
}
