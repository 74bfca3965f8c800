//! CLI command implementations

pub mod commands;
pub mod error;
pub mod progress;

pub use commands::{Cli, Commands, ExportArgs, ReimportArgs};
pub use error::CliError;
pub use progress::BarProgress;
