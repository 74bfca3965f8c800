//! # Coda Exporter Library
//!
//! Bulk export and reimport of coda.io tables through a rate-limited remote API.
//!
//! ## Features
//!
//! - **Full export**: every document, table and view, written as raw JSON, CSV, HTML and
//!   a structured snapshot per table
//! - **Reimport**: replaces the rows of base tables in a destination document with the
//!   rows of a snapshot, after checking that the schemas agree
//! - **Adaptive rate limiting**: one shared backoff window with a single recovery probe
//! - **Bounded concurrency and retries** around every remote call
//!
//! ## Quick Start
//!
//! ```no_run
//! use coda_exporter::api::{ClientConfig, CodaClient};
//! use coda_exporter::pipeline::{ExportOptions, Exporter, NoProgress};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CodaClient::new(&ClientConfig::new("my-api-token"))?;
//! let exporter = Exporter::new(Arc::new(client), ExportOptions::new("./backup"));
//! exporter.export(&CancellationToken::new(), Arc::new(NoProgress)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`concurrency`] - Rate limiter, concurrency gate, retry policy and fan-out strategies
//! - [`api`] - Remote API trait, HTTP client and mutation waiting
//! - [`output`] - Directory layout, CSV/HTML rendering and snapshot files
//! - [`pipeline`] - Export and reimport orchestration
//! - [`cli`] - Command-line interface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// Remote document API
pub mod api;

/// CLI command implementations
pub mod cli;

/// Concurrency control around remote calls
pub mod concurrency;

/// Failure taxonomy
pub mod error;

/// Observability metrics
pub mod metrics;

/// Local output: layout, rendering and snapshots
pub mod output;

/// Export and reimport orchestration
pub mod pipeline;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use error::{Error, FailureClass, Result};

use api::{cell_text, Column, Row, TableRef};

/// Column of a table snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotColumn {
    /// Column id
    pub id: String,
    /// Column name
    pub name: String,
    /// Whether values are computed by the service
    pub calculated: bool,
    /// Formula of a calculated column
    pub formula: Option<String>,
}

impl From<&Column> for SnapshotColumn {
    fn from(column: &Column) -> Self {
        Self {
            id: column.id.clone(),
            name: column.name.clone(),
            calculated: column.calculated,
            formula: column.formula.clone(),
        }
    }
}

/// Row of a table snapshot, cells aligned with the table's columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRow {
    /// Cell values rendered as text
    pub cells: Vec<String>,
}

/// Structured snapshot of one table, the source of truth for reimport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Table id
    pub id: String,
    /// Table name
    pub name: String,
    /// Columns in display order
    pub columns: Vec<SnapshotColumn>,
    /// Rows in table order
    pub rows: Vec<SnapshotRow>,
}

impl TableSnapshot {
    /// Build a snapshot from live remote data.
    ///
    /// Rows are sorted by their remote index. Every row must carry exactly one value
    /// per column.
    pub fn from_remote(table: &TableRef, columns: &[Column], rows: &[Row]) -> Result<Self> {
        let mut ordered: Vec<&Row> = rows.iter().collect();
        ordered.sort_by_key(|row| row.index);
        let rows = ordered
            .into_iter()
            .map(|row| snapshot_row(columns, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: table.id.clone(),
            name: table.name.clone(),
            columns: columns.iter().map(SnapshotColumn::from).collect(),
            rows,
        })
    }

    /// Validate that every row has one cell per column
    pub fn validate(&self) -> std::result::Result<(), String> {
        let expected = self.columns.len();
        for (index, row) in self.rows.iter().enumerate() {
            if row.cells.len() != expected {
                return Err(format!(
                    "Row {} of table '{}' has wrong number of cells. Expected {} columns but found {}",
                    index,
                    self.name,
                    expected,
                    row.cells.len()
                ));
            }
        }
        Ok(())
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

fn snapshot_row(columns: &[Column], row: &Row) -> Result<SnapshotRow> {
    if row.values.len() != columns.len() {
        return Err(Error::MalformedResponse(format!(
            "Row {} has wrong number of cells. Expected {} columns but found {}",
            row.id,
            columns.len(),
            row.values.len()
        )));
    }
    let cells = columns
        .iter()
        .map(|column| {
            row.values.get(&column.id).map(cell_text).ok_or_else(|| {
                Error::MalformedResponse(format!(
                    "Row {} has no value for column {}",
                    row.id, column.id
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SnapshotRow { cells })
}
