//! Report rows derived from georeferenced accidents.
//!
//! Each row type serializes flat, so the binary can write any of them as
//! CSV with a header.

use accident_map_accident_models::{GeoreferencedAccident, UnmatchedCounter};
use accident_map_spatial::{SpatialError, SpatialQuery};
use accident_map_street_index::StreetIndex;
use geo::Point;
use serde::Serialize;

/// An accident with a representative point.
#[derive(Debug, Clone, PartialEq)]
pub struct AccidentLocation {
    pub name: String,
    pub year: i32,
    pub count: u32,
    pub directorate: Option<u32>,
    pub center: Point<f64>,
}

impl AccidentLocation {
    /// `None` when the accident has no center.
    #[must_use]
    pub fn from_accident(accident: &GeoreferencedAccident) -> Option<Self> {
        let center = accident.resolved.center?;
        Some(Self {
            name: accident.record.street_raw.clone(),
            year: accident.record.year,
            count: accident.record.count,
            directorate: accident.record.directorate,
            center,
        })
    }
}

/// One line of the accident list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccidentListRow {
    pub street: String,
    pub count: u32,
    pub year: i32,
    pub directorate: Option<u32>,
    pub lat: f64,
    pub lng: f64,
    /// OSM ids of the matched features, ascending, joined with `-`.
    pub features: String,
}

impl AccidentListRow {
    /// `None` when the accident has no center.
    #[must_use]
    pub fn from_accident(accident: &GeoreferencedAccident, index: &StreetIndex) -> Option<Self> {
        let center = accident.resolved.center?;

        let mut osmids: Vec<i64> = accident
            .resolved
            .feature_ids
            .iter()
            .filter_map(|&id| index.feature(id))
            .map(|feature| feature.osmid)
            .collect();
        osmids.sort_unstable();

        Some(Self {
            street: accident.record.street_raw.clone(),
            count: accident.record.count,
            year: accident.record.year,
            directorate: accident.record.directorate,
            lat: center.y(),
            lng: center.x(),
            features: osmids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("-"),
        })
    }
}

/// An accident attributed to its first matched street.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreetListRow {
    pub osmid: Option<i64>,
    pub name: String,
    pub count: u32,
    pub year: i32,
    pub directorate: Option<u32>,
    /// Geodesic length of the street in meters.
    pub length: Option<f64>,
}

impl StreetListRow {
    /// Unmatched accidents keep their raw street name and no length.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the street's length cannot be measured.
    pub fn from_accident(
        accident: &GeoreferencedAccident,
        index: &StreetIndex,
        spatial: &dyn SpatialQuery,
    ) -> Result<Self, SpatialError> {
        let record = &accident.record;
        let feature = accident
            .resolved
            .feature_ids
            .first()
            .and_then(|&id| index.feature(id));

        let Some(feature) = feature else {
            return Ok(Self {
                osmid: None,
                name: record.street_raw.clone(),
                count: record.count,
                year: record.year,
                directorate: record.directorate,
                length: None,
            });
        };

        Ok(Self {
            osmid: Some(feature.osmid),
            name: feature.name.clone(),
            count: record.count,
            year: record.year,
            directorate: record.directorate,
            length: Some(spatial.geodesic_length(&feature.geometry)?),
        })
    }
}

/// A street name that matched nothing, with how often it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRow {
    pub name: String,
    pub original_name: String,
    pub count: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub osmid: Option<i64>,
}

impl MissingRow {
    /// One row per unmatched name, most frequent first.
    #[must_use]
    pub fn from_counter(unmatched: &UnmatchedCounter) -> Vec<Self> {
        unmatched
            .most_common()
            .into_iter()
            .map(|(name, count)| Self {
                name: name.to_owned(),
                original_name: name.to_owned(),
                count,
                kind: "accidents",
                osmid: None,
            })
            .collect()
    }
}
