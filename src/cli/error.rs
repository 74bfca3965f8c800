//! CLI error types and conversions

use crate::error::Error;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Remote API, concurrency or pipeline failure
    #[error("{0}")]
    PipelineError(#[from] Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
