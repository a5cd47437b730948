//! `ctr` - train and inspect CTR models from the command line.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ctr_cli::{Cli, Commands};

fn main() -> Result<()> {
    // RUST_LOG wins; otherwise log the ctr crates at info.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("ctr=info"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train(cmd) => cmd.run()?,
        Commands::Inspect(cmd) => cmd.run()?,
    }
    Ok(())
}
