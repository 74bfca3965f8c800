//! Remote document API
//!
//! [`RemoteApi`] is the seam between the pipeline and the service. [`CodaClient`] is
//! the HTTP implementation; every request it makes goes through a
//! [`crate::concurrency::CallStack`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub mod client;
pub mod config;
pub mod model;
pub mod mutation;
pub mod pagination;
pub mod shared_resources;

pub use client::CodaClient;
pub use config::ClientConfig;
pub use model::{
    cell_text, CellEdit, Column, Doc, FolderRef, MutationHandle, Row, RowInsert, TableRef,
    TableType,
};
pub use mutation::MutationWaiter;

/// Operations the export and reimport pipelines need from the service
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Every document visible to the token
    async fn list_docs(&self, cancel: &CancellationToken) -> Result<Vec<Doc>>;

    /// One document by id
    async fn get_doc(&self, cancel: &CancellationToken, doc_id: &str) -> Result<Doc>;

    /// Every table and view of a document
    async fn list_tables(&self, cancel: &CancellationToken, doc_id: &str) -> Result<Vec<TableRef>>;

    /// One table by id
    async fn get_table(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
    ) -> Result<TableRef>;

    /// Every column of a table, in display order
    async fn list_columns(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
    ) -> Result<Vec<Column>>;

    /// Every row of a table
    async fn list_rows(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
    ) -> Result<Vec<Row>>;

    /// Request deletion of rows. Completion is asynchronous.
    async fn delete_rows(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
        row_ids: &[String],
    ) -> Result<MutationHandle>;

    /// Request insertion of rows. Completion is asynchronous.
    async fn insert_rows(
        &self,
        cancel: &CancellationToken,
        doc_id: &str,
        table_id: &str,
        rows: &[RowInsert],
    ) -> Result<MutationHandle>;

    /// Whether an accepted mutation has been applied
    async fn mutation_completed(
        &self,
        cancel: &CancellationToken,
        handle: &MutationHandle,
    ) -> Result<bool>;
}
