//! Directory layout of an export
//!
//! ```text
//! <root>/<folder name> <folder id>/<doc name> <doc id>/
//!     doc.json
//!     tables/<table|view>/<table name> <table id>/
//!         table.json
//!         columns/<column name> <column id>.json
//!         rows/<row id>.json
//!         values.csv
//!         values.html
//!         snapshot.json
//! ```
//!
//! Every name component is `<name> <id>` with `/` replaced by `_`, so two resources with
//! the same name never collide. Documents outside any folder go under `no-folder/`.

use std::path::{Path, PathBuf};

use crate::api::{Column, Doc, Row, TableRef, TableType};

/// Raw document object
pub const DOC_FILE: &str = "doc.json";
/// Raw table object
pub const TABLE_FILE: &str = "table.json";
/// Rendered CSV
pub const CSV_FILE: &str = "values.csv";
/// Rendered HTML
pub const HTML_FILE: &str = "values.html";
/// Structured snapshot read back by reimport
pub const SNAPSHOT_FILE: &str = "snapshot.json";

const NO_FOLDER_DIR: &str = "no-folder";
const TABLES_DIR: &str = "tables";
const COLUMNS_DIR: &str = "columns";
const ROWS_DIR: &str = "rows";

/// Path computations rooted at an export directory
#[derive(Debug, Clone)]
pub struct ExportLayout {
    root_dir: PathBuf,
}

impl ExportLayout {
    /// Layout rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Export root
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Directory of one document
    pub fn doc_dir(&self, doc: &Doc) -> PathBuf {
        let folder = if doc.folder.id.is_empty() {
            NO_FOLDER_DIR.to_string()
        } else {
            component(&doc.folder.name, &doc.folder.id)
        };
        self.root_dir.join(folder).join(component(&doc.name, &doc.id))
    }

    /// Directory of one table inside a document directory
    pub fn table_dir(doc_dir: &Path, table: &TableRef) -> PathBuf {
        Self::tables_dir(doc_dir, table.table_type).join(component(&table.name, &table.id))
    }

    /// Directory grouping every table of one type
    pub fn tables_dir(doc_dir: &Path, table_type: TableType) -> PathBuf {
        doc_dir.join(TABLES_DIR).join(table_type.as_str())
    }

    /// Directory of per-column raw objects
    pub fn columns_dir(table_dir: &Path) -> PathBuf {
        table_dir.join(COLUMNS_DIR)
    }

    /// Directory of per-row raw objects
    pub fn rows_dir(table_dir: &Path) -> PathBuf {
        table_dir.join(ROWS_DIR)
    }

    /// Raw object of one column
    pub fn column_file(table_dir: &Path, column: &Column) -> PathBuf {
        Self::columns_dir(table_dir).join(format!("{}.json", component(&column.name, &column.id)))
    }

    /// Raw object of one row
    pub fn row_file(table_dir: &Path, row: &Row) -> PathBuf {
        Self::rows_dir(table_dir).join(format!("{}.json", sanitize(&row.id)))
    }
}

/// `<name> <id>`, made safe for use as a single path component
fn component(name: &str, id: &str) -> String {
    sanitize(&format!("{name} {id}"))
}

/// Replace the path separator so a name cannot introduce extra directories
pub fn sanitize(name: &str) -> String {
    name.replace('/', "_")
}
