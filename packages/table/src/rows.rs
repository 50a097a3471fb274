//! Raw row input.
//!
//! Report tables arrive as headerless CSV exported from the PDF
//! conversion. Rows have no fixed width, so cells missing from a short
//! row read as empty.

use std::io::Read;

use crate::TableError;

/// One physical table row; column position carries the meaning.
pub type RawRow = Vec<String>;

/// Streams rows from headerless, flexible-width CSV.
pub fn read_rows<R: Read>(reader: R) -> impl Iterator<Item = Result<RawRow, TableError>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
        .into_records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_owned).collect())
                .map_err(TableError::from)
        })
}

/// Returns the cell at `column`, or `""` when the row is too short.
#[must_use]
pub fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map_or("", String::as_str)
}
