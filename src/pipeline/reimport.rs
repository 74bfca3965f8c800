//! Reimport of table snapshots into a destination document
//!
//! Every base-table snapshot under the source directory is checked against the live
//! table of the same id before anything is changed. Only when every table is
//! compatible are the rows replaced: the existing rows are deleted, then the snapshot
//! rows are inserted, leaving calculated columns to the service.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::progress::{MutationCallbacks, MutationKind, ProgressHandler, ProgressSink};
use crate::api::{
    CellEdit, Column, MutationHandle, MutationWaiter, RemoteApi, RowInsert, TableRef, TableType,
};
use crate::concurrency::config::ROW_BATCH_SIZE;
use crate::concurrency::{cancel_on_first_error, complete_then_raise_first};
use crate::error::{Error, Result};
use crate::metrics;
use crate::output::{load_base_table_snapshots, LoadedSnapshot};
use crate::{SnapshotColumn, TableSnapshot};

/// What to reimport and where
#[derive(Debug, Clone)]
pub struct ReimportOptions {
    /// Document directory of a previous export
    pub src_dir: PathBuf,
    /// Document receiving the rows
    pub dest_doc_id: String,
    /// Rows per mutation request
    pub batch_size: usize,
}

impl ReimportOptions {
    /// Reimport the snapshots under `src_dir` into `dest_doc_id`
    pub fn new(src_dir: impl Into<PathBuf>, dest_doc_id: impl Into<String>) -> Self {
        Self {
            src_dir: src_dir.into(),
            dest_doc_id: dest_doc_id.into(),
            batch_size: ROW_BATCH_SIZE,
        }
    }

    /// Override the mutation batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Totals of a finished reimport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReimportSummary {
    /// Tables replaced
    pub tables: usize,
    /// Remote rows deleted
    pub rows_deleted: usize,
    /// Snapshot rows inserted
    pub rows_inserted: usize,
}

/// Replaces remote table rows with snapshot rows
pub struct Reimporter {
    api: Arc<dyn RemoteApi>,
    options: ReimportOptions,
    waiter: MutationWaiter,
}

impl Reimporter {
    /// Create a reimporter polling mutations at the default interval
    pub fn new(api: Arc<dyn RemoteApi>, options: ReimportOptions) -> Self {
        Self::with_waiter(api, options, MutationWaiter::default())
    }

    /// Create a reimporter with a custom mutation waiter
    pub fn with_waiter(
        api: Arc<dyn RemoteApi>,
        options: ReimportOptions,
        waiter: MutationWaiter,
    ) -> Self {
        Self {
            api,
            options,
            waiter,
        }
    }

    /// Run the reimport
    ///
    /// # Errors
    /// [`Error::SchemaIncompatible`] if any table disagrees with its snapshot, in which
    /// case nothing has been modified. Otherwise the first failure by table order.
    pub async fn reimport(
        &self,
        cancel: &CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ReimportSummary> {
        let snapshots = load_base_table_snapshots(&self.options.src_dir).await?;
        info!(
            "Reimporting {} tables into document {}",
            snapshots.len(),
            self.options.dest_doc_id
        );

        complete_then_raise_first(snapshots.iter().map(|loaded| {
            let span = info_span!(
                "validate",
                table = %loaded.snapshot.name,
                file = %loaded.path.display()
            );
            self.check_table(cancel, loaded).instrument(span)
        }))
        .await?;
        info!("All tables are compatible, replacing rows");

        let per_table = complete_then_raise_first(snapshots.iter().map(|loaded| {
            let snapshot = &loaded.snapshot;
            let span = info_span!("table", id = %snapshot.id, name = %snapshot.name);
            let label = format!("{} {}", snapshot.name, snapshot.id);
            let handler = ProgressHandler::new(label, 0, progress.clone());
            self.replace_rows(cancel, snapshot, Arc::new(handler))
                .instrument(span)
        }))
        .await?;

        let summary = per_table
            .into_iter()
            .fold(ReimportSummary::default(), |acc, (deleted, inserted)| ReimportSummary {
                tables: acc.tables + 1,
                rows_deleted: acc.rows_deleted + deleted,
                rows_inserted: acc.rows_inserted + inserted,
            });
        info!(
            tables = summary.tables,
            deleted = summary.rows_deleted,
            inserted = summary.rows_inserted,
            "Reimport complete"
        );
        Ok(summary)
    }

    async fn check_table(&self, cancel: &CancellationToken, loaded: &LoadedSnapshot) -> Result<()> {
        let doc_id = &self.options.dest_doc_id;
        let table_id = &loaded.snapshot.id;
        let (table, columns) = tokio::try_join!(
            self.api.get_table(cancel, doc_id, table_id),
            self.api.list_columns(cancel, doc_id, table_id),
        )?;
        check_compatible(&loaded.snapshot, &table, &columns)
    }

    /// Delete every remote row, then insert every snapshot row. Returns the number of
    /// rows deleted and inserted.
    async fn replace_rows(
        &self,
        cancel: &CancellationToken,
        snapshot: &TableSnapshot,
        callbacks: Arc<dyn MutationCallbacks>,
    ) -> Result<(usize, usize)> {
        let doc_id = self.options.dest_doc_id.clone();
        let table_id = snapshot.id.clone();

        let existing: Vec<String> = self
            .api
            .list_rows(cancel, &doc_id, &table_id)
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        let deleted = existing.len();
        let batch_size = self.options.batch_size.max(1);

        // Deletes are independent; issue and await them all concurrently.
        let deletes = existing.chunks(batch_size).map(|batch| {
            let batch = batch.to_vec();
            let (api, waiter) = (self.api.clone(), self.waiter.clone());
            let callbacks = callbacks.clone();
            let (doc_id, table_id) = (doc_id.clone(), table_id.clone());
            move |token: CancellationToken| async move {
                let rows = batch.len();
                let handle = api.delete_rows(&token, &doc_id, &table_id, &batch).await?;
                callbacks.issued(MutationKind::Delete, rows);
                settle(&*api, &waiter, &token, &handle, &*callbacks, MutationKind::Delete, rows)
                    .await
            }
        });
        cancel_on_first_error(cancel, deletes.collect::<Vec<_>>()).await?;
        info!(rows = deleted, "Deleted existing rows");

        // Inserts are issued one batch at a time so the rows keep their order; only the
        // waits for completion fan out.
        let inserts = insert_rows(snapshot);
        let mut pending = Vec::new();
        for batch in inserts.chunks(batch_size) {
            let handle = self.api.insert_rows(cancel, &doc_id, &table_id, batch).await?;
            callbacks.issued(MutationKind::Insert, batch.len());
            pending.push((handle, batch.len()));
        }
        let waits = pending.into_iter().map(|(handle, rows)| {
            let (api, waiter) = (self.api.clone(), self.waiter.clone());
            let callbacks = callbacks.clone();
            move |token: CancellationToken| async move {
                settle(&*api, &waiter, &token, &handle, &*callbacks, MutationKind::Insert, rows)
                    .await
            }
        });
        cancel_on_first_error(cancel, waits.collect::<Vec<_>>()).await?;
        info!(rows = inserts.len(), "Inserted snapshot rows");

        Ok((deleted, inserts.len()))
    }
}

/// Wait for an issued mutation to apply, then fire `completed`.
async fn settle(
    api: &dyn RemoteApi,
    waiter: &MutationWaiter,
    cancel: &CancellationToken,
    handle: &MutationHandle,
    callbacks: &dyn MutationCallbacks,
    kind: MutationKind,
    rows: usize,
) -> Result<()> {
    waiter.wait(api, cancel, handle).await?;
    callbacks.completed(kind, rows);
    metrics::record_mutation_completed(rows);
    Ok(())
}

/// Insert payload for every snapshot row, leaving out calculated columns
pub fn insert_rows(snapshot: &TableSnapshot) -> Vec<RowInsert> {
    snapshot
        .rows
        .iter()
        .map(|row| RowInsert {
            cells: snapshot
                .columns
                .iter()
                .zip(&row.cells)
                .filter(|(column, _)| !column.calculated)
                .map(|(column, cell)| CellEdit {
                    column: column.id.clone(),
                    value: Value::String(cell.clone()),
                })
                .collect(),
        })
        .collect()
}

/// Check that a live table can receive the rows of `snapshot`.
///
/// The table must have the same name and be a base table. Every snapshot column must
/// exist remotely with the same name and calculated flag. Extra remote columns are
/// allowed and keep their defaults.
pub fn check_compatible(
    snapshot: &TableSnapshot,
    table: &TableRef,
    columns: &[Column],
) -> Result<()> {
    let mismatch =
        |column: Option<&SnapshotColumn>, property: &str, expected: String, found: String| {
            Error::SchemaIncompatible {
                table: snapshot.name.clone(),
                column: column.map(|c| c.name.clone()),
                property: property.to_string(),
                expected,
                found,
            }
        };

    if table.name != snapshot.name {
        return Err(mismatch(None, "name", snapshot.name.clone(), table.name.clone()));
    }
    if table.table_type != TableType::Table {
        return Err(mismatch(
            None,
            "type",
            TableType::Table.to_string(),
            table.table_type.to_string(),
        ));
    }

    for expected in &snapshot.columns {
        let Some(remote) = columns.iter().find(|c| c.id == expected.id) else {
            return Err(mismatch(
                Some(expected),
                "presence",
                format!("column {}", expected.id),
                "missing".to_string(),
            ));
        };
        if remote.name != expected.name {
            return Err(mismatch(
                Some(expected),
                "name",
                expected.name.clone(),
                remote.name.clone(),
            ));
        }
        if remote.calculated != expected.calculated {
            return Err(mismatch(
                Some(expected),
                "calculated",
                expected.calculated.to_string(),
                remote.calculated.to_string(),
            ));
        }
    }

    if columns.len() > snapshot.columns.len() {
        warn!(
            table = %snapshot.name,
            extra = columns.len() - snapshot.columns.len(),
            "Remote table has columns missing from the snapshot"
        );
    }
    Ok(())
}
