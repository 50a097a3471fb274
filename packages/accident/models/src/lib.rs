#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Accident record types shared across the accident-map pipeline.
//!
//! The table parser produces [`AccidentRecord`]s, the georeferencer turns
//! them into [`ResolvedAccident`]s, and every street name that could not
//! be matched against the street network is tallied in an
//! [`UnmatchedCounter`] that the caller owns and passes along explicitly.

use std::collections::BTreeMap;

use geo::Point;
use serde::{Deserialize, Serialize};

/// Stable index of a street feature inside a built street index.
///
/// Ids are assigned once at index construction and never change for the
/// lifetime of the index.
pub type FeatureId = usize;

/// One `(street, count, directorate)` triple recovered from an accident
/// report table, stamped with the report year.
///
/// Immutable once emitted by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccidentRecord {
    /// Report year the table belongs to.
    pub year: i32,
    /// Police directorate the row was listed under, if one was known by
    /// the end of the table.
    pub directorate: Option<u32>,
    /// Street name exactly as reassembled from the table, whitespace
    /// collapsed. May name several streets separated by `" / "`.
    #[serde(rename = "street")]
    pub street_raw: String,
    /// Number of accidents reported for the street.
    pub count: u32,
}

impl AccidentRecord {
    /// District key used for street resolution.
    ///
    /// Directorates are keyed by their decimal number in the district
    /// datasets.
    #[must_use]
    pub fn district_name(&self) -> Option<String> {
        self.directorate.map(|d| d.to_string())
    }
}

/// The result of resolving one accident's streets against the network.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAccident {
    /// The individual street names that were looked up.
    pub streets: Vec<String>,
    /// Matched features, in input order, without duplicates.
    pub feature_ids: Vec<FeatureId>,
    /// Representative point (`x` = longitude, `y` = latitude).
    ///
    /// Always `None` when `feature_ids` is empty.
    pub center: Option<Point<f64>>,
}

impl ResolvedAccident {
    /// Whether at least one street resolved to a feature.
    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.feature_ids.is_empty()
    }
}

/// A parsed record paired with its resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoreferencedAccident {
    /// The record as it came out of the table parser.
    pub record: AccidentRecord,
    /// Where the record's streets resolved to.
    pub resolved: ResolvedAccident,
}

/// Tally of street names that matched no network feature.
///
/// Append-only: counts only ever grow during a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmatchedCounter {
    counts: BTreeMap<String, u64>,
}

impl UnmatchedCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Records one more miss for `raw_name`.
    pub fn record(&mut self, raw_name: &str) {
        *self.counts.entry(raw_name.to_owned()).or_insert(0) += 1;
    }

    /// Number of misses recorded for `raw_name`.
    #[must_use]
    pub fn get(&self, raw_name: &str) -> u64 {
        self.counts.get(raw_name).copied().unwrap_or(0)
    }

    /// Number of distinct names recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all recorded misses.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// All names with their counts, most frequent first.
    ///
    /// Names with equal counts are ordered alphabetically.
    #[must_use]
    pub fn most_common(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self
            .counts
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}
