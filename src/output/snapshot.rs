//! Snapshot files
//!
//! `snapshot.json` is the structured form of a table written by export and read back
//! by reimport. Loading checks the row/column invariant again, since the file may
//! have been edited by hand.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::path::{ExportLayout, SNAPSHOT_FILE};
use super::{OutputError, OutputResult};
use crate::api::TableType;
use crate::TableSnapshot;

/// A snapshot together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// Snapshot file
    pub path: PathBuf,
    /// Parsed snapshot
    pub snapshot: TableSnapshot,
}

/// Serialize a snapshot for writing
pub fn snapshot_json(table: &TableSnapshot) -> OutputResult<String> {
    serde_json::to_string_pretty(table).map_err(|e| OutputError::SerializationError(e.to_string()))
}

/// Read and validate one snapshot file
pub async fn load_snapshot(path: &Path) -> OutputResult<TableSnapshot> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OutputError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let snapshot: TableSnapshot =
        serde_json::from_str(&text).map_err(|e| OutputError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    snapshot
        .validate()
        .map_err(|reason| OutputError::InvalidSnapshot {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(snapshot)
}

/// Load the snapshot of every base table exported under `doc_dir`, ordered by
/// directory name. Views are skipped; they have no rows of their own to reimport.
pub async fn load_base_table_snapshots(doc_dir: &Path) -> OutputResult<Vec<LoadedSnapshot>> {
    if !tokio::fs::try_exists(doc_dir).await.unwrap_or(false) {
        return Err(OutputError::IoError(format!(
            "Source directory {} does not exist",
            doc_dir.display()
        )));
    }

    let tables_dir = ExportLayout::tables_dir(doc_dir, TableType::Table);
    let mut entries = match tokio::fs::read_dir(&tables_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No base tables found under {}", tables_dir.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(OutputError::IoError(format!(
                "Failed to list {}: {}",
                tables_dir.display(),
                e
            )))
        }
    };

    let mut table_dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| {
            OutputError::IoError(format!("Failed to list {}: {}", tables_dir.display(), e))
        })?
    {
        let path = entry.path();
        if path.is_dir() {
            table_dirs.push(path);
        }
    }
    table_dirs.sort();

    let mut snapshots = Vec::with_capacity(table_dirs.len());
    for dir in table_dirs {
        let path = dir.join(SNAPSHOT_FILE);
        let snapshot = load_snapshot(&path).await?;
        debug!(table = %snapshot.name, rows = snapshot.rows.len(), "Loaded snapshot");
        snapshots.push(LoadedSnapshot { path, snapshot });
    }
    Ok(snapshots)
}
