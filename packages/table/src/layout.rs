//! Table layout descriptors.
//!
//! A [`TableLayout`] names the column roles and the terminal classifiers
//! of one report-table layout. It is plain serde data so layouts can live
//! in TOML next to the pipeline config; [`TableLayout::compile`] turns it
//! into a [`CompiledLayout`] with the regexes built once.

use std::num::ParseIntError;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::TableError;

/// Street-name fragment: mostly uppercase, at least five characters, no
/// lowercase letters after the leading run. A lone `/` separator between
/// two streets also qualifies.
pub const DEFAULT_STREET_PATTERN: &str =
    r"^([A-Z\dÖÄÜß\-\(]{2,}|\s*/\s*)[^a-z]+[A-ZÖÄÜß-]{2}[^a-z]*$";

/// Continuation fragment accepted once a name is already long: anything
/// without lowercase letters.
pub const DEFAULT_SHORT_STREET_PATTERN: &str = r"^[^a-z]+$";

/// Leading integer of a cell, surrounding whitespace allowed.
static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").expect("valid regex"));

/// Column roles and classifier settings for one report-table layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    /// Column holding directorate numbers. Rows with any other text in
    /// this column are skipped entirely.
    pub marker_column: usize,
    /// Column holding street-name fragments and section-end text.
    pub name_column: usize,
    /// Column holding accident counts.
    pub count_column: usize,
    /// Directorates must be strictly greater than this.
    pub directorate_min_exclusive: u32,
    /// Directorates must be strictly less than this.
    pub directorate_max_exclusive: u32,
    /// Once the accumulated name is longer than this many characters,
    /// fragments are matched with `short_street_pattern`.
    pub long_name_threshold: usize,
    /// Count assigned to a street closed by a section-end marker.
    pub default_count: u32,
    pub street_pattern: String,
    pub short_street_pattern: String,
    /// Name-column prefixes that mark the end of a directorate section.
    pub section_end_prefixes: Vec<String>,
    /// Older layouts print the count on the middle row of a wrapped name.
    /// When set, a count on a row without a name fragment keeps the street
    /// open for one more continuation fragment.
    pub late_suffix: bool,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            marker_column: 0,
            name_column: 2,
            count_column: 3,
            directorate_min_exclusive: 0,
            directorate_max_exclusive: 70,
            long_name_threshold: 35,
            default_count: 1,
            street_pattern: DEFAULT_STREET_PATTERN.to_owned(),
            short_street_pattern: DEFAULT_SHORT_STREET_PATTERN.to_owned(),
            section_end_prefixes: vec!["in der Direktion".to_owned()],
            late_suffix: false,
        }
    }
}

impl TableLayout {
    /// Parses a layout from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Layout`] if the TOML is malformed.
    pub fn from_toml_str(s: &str) -> Result<Self, TableError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads a layout TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validates the patterns and builds the classifiers.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Regex`] if either pattern is invalid.
    pub fn compile(&self) -> Result<CompiledLayout, TableError> {
        Ok(CompiledLayout {
            street: Regex::new(&self.street_pattern)?,
            short_street: Regex::new(&self.short_street_pattern)?,
            layout: self.clone(),
        })
    }
}

/// A [`TableLayout`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledLayout {
    layout: TableLayout,
    street: Regex,
    short_street: Regex,
}

impl CompiledLayout {
    #[must_use]
    pub const fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Whether `value` may start a new directorate section after
    /// `current`. Directorates never decrease within one table.
    #[must_use]
    pub fn accepts_directorate(&self, value: u32, current: Option<u32>) -> bool {
        value > self.layout.directorate_min_exclusive
            && value < self.layout.directorate_max_exclusive
            && current.is_none_or(|current| value > current)
    }

    /// Whether `cell` is a street-name fragment. `loose` selects the
    /// continuation pattern.
    #[must_use]
    pub fn is_fragment(&self, cell: &str, loose: bool) -> bool {
        if loose {
            self.short_street.is_match(cell)
        } else {
            self.street.is_match(cell)
        }
    }

    #[must_use]
    pub fn is_section_end(&self, cell: &str) -> bool {
        self.layout
            .section_end_prefixes
            .iter()
            .any(|prefix| cell.starts_with(prefix.as_str()))
    }
}

/// Parses the integer at the start of `cell`. `Ok(None)` when the cell
/// does not start with a digit.
///
/// # Errors
///
/// Returns the parse error if the digits do not fit a `u32`.
pub fn leading_number(cell: &str) -> Result<Option<u32>, ParseIntError> {
    LEADING_NUMBER_RE
        .captures(cell)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().parse())
        .transpose()
}
