//! Local output: directory layout, rendering and snapshot files

use std::path::{Path, PathBuf};

use crate::error::Error;

pub mod csv;
pub mod html;
pub mod path;
pub mod snapshot;

pub use self::csv::render_csv;
pub use self::html::render_html;
pub use self::path::ExportLayout;
pub use self::snapshot::{load_base_table_snapshots, load_snapshot, snapshot_json, LoadedSnapshot};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Refusing to overwrite an existing export
    #[error("destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Snapshot file violates the snapshot invariants
    #[error("invalid snapshot {}: {reason}", path.display())]
    InvalidSnapshot {
        /// Snapshot file
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

impl From<OutputError> for Error {
    fn from(err: OutputError) -> Self {
        Error::Io(err.to_string())
    }
}

/// Create a directory that must not exist yet, creating missing parents.
pub async fn create_new_dir(path: &Path) -> OutputResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            OutputError::IoError(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    match tokio::fs::create_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(OutputError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(OutputError::IoError(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Create a directory and any missing parents
pub async fn ensure_dir(path: &Path) -> OutputResult<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        OutputError::IoError(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ))
    })
}

/// Write `contents` to `path`, replacing any existing file
pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> OutputResult<()> {
    tokio::fs::write(path, contents).await.map_err(|e| {
        OutputError::IoError(format!("Failed to write {}: {}", path.display(), e))
    })
}
