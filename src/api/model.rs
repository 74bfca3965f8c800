//! Remote resource shapes
//!
//! Each resource keeps the raw JSON object it was parsed from, so export can write
//! the unmodified snapshot next to the rendered output.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Resource parsed from a JSON object that keeps its raw form
pub trait RemoteResource: DeserializeOwned {
    /// Attach the raw object
    fn set_raw(&mut self, raw: Value);

    /// Parse `raw`, keeping a copy of it
    fn from_raw(raw: Value) -> Result<Self> {
        let mut parsed: Self = serde_json::from_value(raw.clone())
            .map_err(|e| Error::MalformedResponse(format!("{e} in {raw}")))?;
        parsed.set_raw(raw);
        Ok(parsed)
    }
}

/// Folder a document lives in
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FolderRef {
    /// Folder id
    pub id: String,
    /// Folder name (absent for some workspaces)
    #[serde(default)]
    pub name: String,
}

/// Document metadata
#[derive(Debug, Clone, Deserialize)]
pub struct Doc {
    /// Document id
    pub id: String,
    /// Document name
    pub name: String,
    /// Containing folder
    #[serde(default)]
    pub folder: FolderRef,
    /// Raw object
    #[serde(skip)]
    pub raw: Value,
}

impl RemoteResource for Doc {
    fn set_raw(&mut self, raw: Value) {
        self.raw = raw;
    }
}

/// Kind of table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    /// Base table holding its own rows
    Table,
    /// View onto another table
    View,
}

impl TableType {
    /// Directory and display name
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Table => "table",
            TableType::View => "view",
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table metadata
#[derive(Debug, Clone, Deserialize)]
pub struct TableRef {
    /// Table id
    pub id: String,
    /// Table name
    pub name: String,
    /// Base table or view
    #[serde(rename = "tableType")]
    pub table_type: TableType,
    /// Raw object
    #[serde(skip)]
    pub raw: Value,
}

impl RemoteResource for TableRef {
    fn set_raw(&mut self, raw: Value) {
        self.raw = raw;
    }
}

/// Column metadata
#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    /// Column id
    pub id: String,
    /// Column name
    pub name: String,
    /// Whether values are computed by the service
    #[serde(default)]
    pub calculated: bool,
    /// Formula of a calculated column
    #[serde(default)]
    pub formula: Option<String>,
    /// Raw object
    #[serde(skip)]
    pub raw: Value,
}

impl RemoteResource for Column {
    fn set_raw(&mut self, raw: Value) {
        self.raw = raw;
    }
}

/// Row with its cell values keyed by column id
#[derive(Debug, Clone, Deserialize)]
pub struct Row {
    /// Row id
    pub id: String,
    /// Position of the row in the table
    pub index: i64,
    /// Cell values keyed by column id
    #[serde(default)]
    pub values: Map<String, Value>,
    /// Raw object
    #[serde(skip)]
    pub raw: Value,
}

impl RemoteResource for Row {
    fn set_raw(&mut self, raw: Value) {
        self.raw = raw;
    }
}

/// One page of a list response
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    /// Items on this page
    pub items: Vec<Value>,
    /// Absolute URL of the next page; absent on the last page
    #[serde(rename = "nextPageLink", default)]
    pub next_page_link: Option<String>,
}

impl Page {
    /// Parse a list response body
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::MalformedResponse(format!("invalid page: {e}")))
    }
}

/// Identifier of an accepted asynchronous mutation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MutationHandle {
    /// Server-issued request id
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Response of the mutation status endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct MutationStatus {
    /// Whether the mutation has been applied
    pub completed: bool,
}

/// One cell of a row insert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellEdit {
    /// Column id
    pub column: String,
    /// New value
    pub value: Value,
}

/// One row of an insert request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowInsert {
    /// Cells to set
    pub cells: Vec<CellEdit>,
}

/// Render a cell value as text: strings verbatim, null as empty, everything else as JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
