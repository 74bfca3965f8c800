//! HTML rendering of a table snapshot

use crate::{SnapshotColumn, TableSnapshot};

/// Render `table` as a standalone HTML page holding a single `<table>`.
///
/// Each header cell carries the column formula (or "no formula") as its title.
pub fn render_html(table: &TableSnapshot) -> String {
    let headers: String = table.columns.iter().map(column_header).collect();
    let rows: String = table
        .rows
        .iter()
        .map(|row| {
            let cells: String = row
                .cells
                .iter()
                .map(|cell| format!("<td>{}</td>", escape(cell)))
                .collect();
            format!("<tr>{cells}</tr>")
        })
        .collect();

    format!(
        "<html><head/><body><table><thead><tr>{headers}</tr></thead><tbody>{rows}</tbody></table></body></html>"
    )
}

fn column_header(column: &SnapshotColumn) -> String {
    let formula = column.formula.as_deref().unwrap_or("no formula");
    format!(
        "<th title=\"{}\">{}</th>",
        escape(formula),
        escape(&column.name)
    )
}

/// Escape text for use in element content and quoted attributes
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
