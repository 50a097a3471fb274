#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Accident report table parsing.
//!
//! The police publish yearly accident statistics as tables converted from
//! PDF. The conversion has no schema: directorate headers may appear
//! before or after their rows, street names wrap across several physical
//! rows, and counts sit on whichever row the layout engine chose. This
//! crate recovers `(street, count, directorate)` triples with a single
//! forward-only state machine ([`TableParser`]) configured by a
//! [`TableLayout`] descriptor, so each historical table layout is a
//! config change rather than a separate parser.

pub mod layout;
pub mod parser;
pub mod rows;

pub use layout::{CompiledLayout, TableLayout};
pub use parser::{TableParser, parse_rows};
pub use rows::{RawRow, read_rows};

/// Errors raised while reading or parsing a table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// A cell that is neither a name fragment nor a section end arrived
    /// while a street name was still open. Everything after this point
    /// would be attributed to the wrong street, so parsing stops.
    #[error("row {line}: unrecognized cell {cell:?} while reading street {pending:?}")]
    StructuralParse {
        /// 1-based row number.
        line: usize,
        /// The offending name-column cell.
        cell: String,
        /// The street name accumulated so far.
        pending: String,
    },

    /// The table ended while a street name was still waiting for its
    /// count.
    #[error("table ended while street {name:?} was still missing its count")]
    UnterminatedName {
        /// The street name accumulated so far.
        name: String,
    },

    /// A marker or count cell starts with digits that do not fit the
    /// counter type.
    #[error("row {line}: number {cell:?} is out of range")]
    InvalidNumber {
        /// 1-based row number.
        line: usize,
        /// The offending cell.
        cell: String,
        source: std::num::ParseIntError,
    },

    /// A configured pattern failed to compile.
    #[error("Invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    /// The layout descriptor could not be deserialized.
    #[error("Invalid table layout: {0}")]
    Layout(#[from] toml::de::Error),

    /// A row could not be read from the CSV input.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
