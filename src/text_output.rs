//! Text output builder for CLI mode.
//!
//! Formats the current page as an aligned column listing driven by the
//! table's column list.

use crate::config::TableConfig;
use crate::model::{DeletionPreview, Row, RowSet};
use serde_json::Value;

const MAX_CELL_WIDTH: usize = 40;

/// Pre-formatted lines for text output.
pub(crate) struct TextListing {
    pub lines: Vec<String>,
}

/// Display form of one cell.
pub(crate) fn cell_text(value: Option<&Value>) -> String {
    let raw = match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::Bool(true)) => "Yes".to_string(),
        Some(Value::Bool(false)) => "No".to_string(),
        Some(Value::String(s)) if s.is_empty() => "-".to_string(),
        Some(Value::String(s)) => s.replace('\n', " "),
        Some(other) => other.to_string(),
    };
    if raw.chars().count() > MAX_CELL_WIDTH {
        let mut cut: String = raw.chars().take(MAX_CELL_WIDTH - 1).collect();
        cut.push('…');
        cut
    } else {
        raw
    }
}

fn row_cells(table: &TableConfig, row: &Row) -> Vec<String> {
    table
        .columns
        .iter()
        .map(|c| cell_text(row.get(&c.field).as_ref()))
        .collect()
}

/// Build the listing for one page. `skip` is the offset the page was
/// fetched at.
pub(crate) fn build_listing(table: &TableConfig, rows: &RowSet, skip: u64) -> TextListing {
    let headers: Vec<String> = table.columns.iter().map(|c| c.header.clone()).collect();
    let body: Vec<Vec<String>> = rows.rows.iter().map(|r| row_cells(table, r)).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(body.len() + 3);
    lines.push(table.title.clone());
    lines.push(join_padded(&headers, &widths));
    for cells in &body {
        lines.push(join_padded(cells, &widths));
    }
    lines.push(footer(skip, rows.rows.len() as u64, rows.total));
    TextListing { lines }
}

fn join_padded(cells: &[String], widths: &[usize]) -> String {
    let mut out = String::new();
    for (i, (cell, w)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(cell);
        let pad = w.saturating_sub(cell.chars().count());
        out.extend(std::iter::repeat(' ').take(pad));
    }
    out.trim_end().to_string()
}

fn footer(skip: u64, shown: u64, total: u64) -> String {
    if shown == 0 {
        return format!("No rows ({total} total)");
    }
    format!("Rows {}-{} of {total}", skip + 1, skip + shown)
}

/// One `header  value` line per column for a single record, then its link.
pub(crate) fn row_lines(table: &TableConfig, row: &Row) -> Vec<String> {
    let width = table
        .columns
        .iter()
        .map(|c| c.header.chars().count())
        .chain(std::iter::once("Link".len()))
        .max()
        .unwrap_or(0);
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .zip(row_cells(table, row))
        .map(|(c, cell)| format!("{:<width$}  {cell}", c.header))
        .collect();
    let link = format!("{}/{}", table.link_prefix.trim_end_matches('/'), row.pk);
    lines.push(format!("{:<width$}  {link}", "Link"));
    lines
}

/// Lines describing a pending cascade delete.
pub(crate) fn preview_lines(preview: &DeletionPreview) -> Vec<String> {
    let mut lines = vec![preview.summary()];
    if !preview.dependents.is_empty() {
        let pks: Vec<String> = preview.dependents.iter().map(|pk| pk.to_string()).collect();
        lines.push(format!("Dependents: {}", pks.join(", ")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_table;
    use crate::model::Pk;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn cells_render_nulls_and_bools() {
        assert_eq!(cell_text(None), "-");
        assert_eq!(cell_text(Some(&Value::Null)), "-");
        assert_eq!(cell_text(Some(&json!(true))), "Yes");
        assert_eq!(cell_text(Some(&json!(false))), "No");
        assert_eq!(cell_text(Some(&json!(0))), "0");
        assert_eq!(cell_text(Some(&json!("Running"))), "Running");
    }

    #[test]
    fn long_cells_are_truncated() {
        let long = "x".repeat(100);
        let text = cell_text(Some(&json!(long)));
        assert_eq!(text.chars().count(), MAX_CELL_WIDTH);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn listing_aligns_columns_and_reports_range() {
        let table = builtin_table("groupnode").unwrap();
        let rows = RowSet {
            rows: vec![
                Row::new(Pk(100)).with_field("label", "first"),
                Row::new(Pk(7)).with_field("label", "b"),
            ],
            total: 37,
        };
        let listing = build_listing(&table, &rows, 30);
        assert_eq!(listing.lines[0], "Groups");
        assert!(listing.lines[1].starts_with("PK   Created"));
        assert!(listing.lines[2].starts_with("100  -"));
        assert!(listing.lines[3].starts_with("7    -"));
        assert_eq!(listing.lines.last().unwrap(), "Rows 31-32 of 37");
    }

    #[test]
    fn empty_page_footer() {
        let table = builtin_table("datanode").unwrap();
        let listing = build_listing(&table, &RowSet::default(), 0);
        assert_eq!(listing.lines.last().unwrap(), "No rows (0 total)");
    }

    #[test]
    fn single_row_lines() {
        let table = builtin_table("groupnode").unwrap();
        let row = Row::new(Pk(5))
            .with_field("label", "renamed")
            .with_field("description", "");
        let lines = row_lines(&table, &row);
        assert_eq!(lines[0], "PK           5");
        assert_eq!(lines[2], "Label        renamed");
        assert_eq!(lines[3], "Description  -");
        assert_eq!(lines.last().unwrap(), "Link         /groupnode/5");
    }

    #[test]
    fn preview_lists_dependents() {
        let preview = DeletionPreview {
            target: Pk(10),
            dependents: BTreeSet::from([Pk(11), Pk(12)]),
        };
        assert_eq!(
            preview_lines(&preview),
            vec![
                "Delete PK<10> and 2 dependents?".to_string(),
                "Dependents: 11, 12".to_string()
            ]
        );
    }
}
