//! Export of documents to the local layout
//!
//! Traversal order:
//! 1. Enumerate every document (or fetch the one requested) before any table work.
//! 2. Per document, enumerate every table, then export the tables concurrently.
//! 3. Per table, fetch columns and rows concurrently, then write every file.
//!
//! Documents, tables and file writes all fan out with
//! [`complete_then_raise_first`], so one failure never abandons sibling work halfway;
//! whatever was written stays on disk.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::progress::{ProgressHandler, ProgressSink};
use crate::api::{Doc, RemoteApi, TableRef};
use crate::concurrency::config::DEFAULT_FILE_CONCURRENCY;
use crate::concurrency::{complete_then_raise_first, ConcurrencyGate};
use crate::error::{Error, Result};
use crate::output::path::{CSV_FILE, DOC_FILE, HTML_FILE, SNAPSHOT_FILE, TABLE_FILE};
use crate::output::{
    create_new_dir, ensure_dir, render_csv, render_html, snapshot_json, write_file, ExportLayout,
};
use crate::TableSnapshot;

/// What to export and where
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Export root
    pub dest_dir: PathBuf,
    /// Export only this document instead of every visible one
    pub src_doc_id: Option<String>,
    /// Maximum file writes in flight
    pub file_concurrency: usize,
}

impl ExportOptions {
    /// Export every document into `dest_dir`
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            src_doc_id: None,
            file_concurrency: DEFAULT_FILE_CONCURRENCY,
        }
    }

    /// Restrict the export to one document
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.src_doc_id = Some(doc_id.into());
        self
    }

    /// Override the file write limit
    pub fn with_file_concurrency(mut self, limit: usize) -> Self {
        self.file_concurrency = limit;
        self
    }
}

/// Totals of a finished export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Documents exported
    pub docs: usize,
    /// Tables and views exported
    pub tables: usize,
    /// Rows exported
    pub rows: usize,
}

/// Exports documents through a [`RemoteApi`]
pub struct Exporter {
    api: Arc<dyn RemoteApi>,
    layout: ExportLayout,
    src_doc_id: Option<String>,
    files: ConcurrencyGate,
}

impl Exporter {
    /// Create an exporter
    pub fn new(api: Arc<dyn RemoteApi>, options: ExportOptions) -> Self {
        Self {
            api,
            layout: ExportLayout::new(options.dest_dir),
            src_doc_id: options.src_doc_id,
            files: ConcurrencyGate::new(options.file_concurrency),
        }
    }

    /// Run the export
    ///
    /// # Errors
    /// Returns the first failure by submission order once every started document has
    /// finished. A document whose directory already exists fails without being
    /// touched.
    pub async fn export(
        &self,
        cancel: &CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ExportSummary> {
        let docs = match &self.src_doc_id {
            Some(doc_id) => vec![self.api.get_doc(cancel, doc_id).await?],
            None => self.api.list_docs(cancel).await?,
        };
        info!(
            "Exporting {} documents to {}",
            docs.len(),
            self.layout.root_dir().display()
        );
        ensure_dir(self.layout.root_dir()).await?;

        let per_doc = complete_then_raise_first(docs.iter().map(|doc| {
            let span = info_span!("doc", id = %doc.id, name = %doc.name);
            self.export_doc(cancel, doc, progress.clone()).instrument(span)
        }))
        .await?;

        let summary = per_doc
            .into_iter()
            .fold(ExportSummary::default(), |acc, doc| ExportSummary {
                docs: acc.docs + doc.docs,
                tables: acc.tables + doc.tables,
                rows: acc.rows + doc.rows,
            });
        info!(
            docs = summary.docs,
            tables = summary.tables,
            rows = summary.rows,
            "Export complete"
        );
        Ok(summary)
    }

    async fn export_doc(
        &self,
        cancel: &CancellationToken,
        doc: &Doc,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ExportSummary> {
        let doc_dir = self.layout.doc_dir(doc);
        create_new_dir(&doc_dir).await?;
        self.write(cancel, doc_dir.join(DOC_FILE), pretty(&doc.raw)?)
            .await?;

        let tables = self.api.list_tables(cancel, &doc.id).await?;
        info!("Exporting {} tables", tables.len());
        let label = format!("{} {}", doc.name, doc.id);
        let handler = ProgressHandler::new(label, tables.len() as u64, progress);

        let rows = complete_then_raise_first(tables.iter().map(|table| {
            let span = info_span!("table", id = %table.id, name = %table.name);
            self.export_table(cancel, doc, &doc_dir, table, &handler)
                .instrument(span)
        }))
        .await?;

        Ok(ExportSummary {
            docs: 1,
            tables: tables.len(),
            rows: rows.into_iter().sum(),
        })
    }

    async fn export_table(
        &self,
        cancel: &CancellationToken,
        doc: &Doc,
        doc_dir: &Path,
        table: &TableRef,
        handler: &ProgressHandler,
    ) -> Result<usize> {
        let table_dir = ExportLayout::table_dir(doc_dir, table);
        create_new_dir(&table_dir).await?;

        let (columns, rows) = tokio::try_join!(
            self.api.list_columns(cancel, &doc.id, &table.id),
            self.api.list_rows(cancel, &doc.id, &table.id),
        )?;
        let snapshot = TableSnapshot::from_remote(table, &columns, &rows)?;
        debug!(
            columns = columns.len(),
            rows = rows.len(),
            "Fetched table contents"
        );

        ensure_dir(&ExportLayout::columns_dir(&table_dir)).await?;
        ensure_dir(&ExportLayout::rows_dir(&table_dir)).await?;

        let mut files = vec![
            (table_dir.join(TABLE_FILE), pretty(&table.raw)?),
            (table_dir.join(CSV_FILE), render_csv(&snapshot)?),
            (table_dir.join(HTML_FILE), render_html(&snapshot)),
            (table_dir.join(SNAPSHOT_FILE), snapshot_json(&snapshot)?),
        ];
        for column in &columns {
            files.push((ExportLayout::column_file(&table_dir, column), pretty(&column.raw)?));
        }
        for row in &rows {
            files.push((ExportLayout::row_file(&table_dir, row), pretty(&row.raw)?));
        }

        complete_then_raise_first(
            files
                .into_iter()
                .map(|(path, contents)| self.write(cancel, path, contents)),
        )
        .await?;

        handler.increment_done();
        info!(rows = rows.len(), "Exported {} '{}'", table.table_type, table.name);
        Ok(rows.len())
    }

    /// Write one file inside the file gate
    async fn write(
        &self,
        cancel: &CancellationToken,
        path: PathBuf,
        contents: String,
    ) -> Result<()> {
        self.files
            .run(cancel, || async move {
                write_file(&path, contents).await.map_err(Error::from)
            })
            .await
    }
}

fn pretty(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
