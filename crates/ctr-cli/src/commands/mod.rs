//! CLI command implementations.
//!
//! - [`train`]: fit a model and report the test AUC
//! - [`inspect`]: print a model's parameter summary

mod inspect;
mod train;

pub use inspect::InspectCommand;
pub use train::{AfmModeArg, OptimizerArg, TrainCommand};
