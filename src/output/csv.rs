//! CSV rendering of a table snapshot
//!
//! Every field is quoted, including the header of column names.

use csv::{QuoteStyle, WriterBuilder};

use super::{OutputError, OutputResult};
use crate::TableSnapshot;

/// Render `table` as CSV: one header row of column names, then one record per row.
pub fn render_csv(table: &TableSnapshot) -> OutputResult<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer
        .write_record(table.columns.iter().map(|c| c.name.as_str()))
        .map_err(|e| OutputError::CsvError(format!("Failed to write header: {}", e)))?;
    for row in &table.rows {
        writer
            .write_record(&row.cells)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| OutputError::CsvError(format!("Failed to flush: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| OutputError::SerializationError(e.to_string()))
}
