#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street network and district types.
//!
//! This crate contains only data types and configuration structs. Loading
//! and lookup live in `accident_map_street_index`.

use std::path::PathBuf;

use geo::{Geometry, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

/// `osmid` given to synthetic features injected from point aliases.
pub const SYNTHETIC_OSMID: i64 = -1;

/// One named element of the base street network.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetFeature {
    /// Position of the feature in the index's feature array.
    pub id: usize,
    /// Street name as published in the network.
    pub name: String,
    /// OpenStreetMap way id, or [`SYNTHETIC_OSMID`] for injected points.
    pub osmid: i64,
    /// Usually a `LineString` or `MultiLineString` in lon/lat order.
    pub geometry: Geometry<f64>,
}

impl StreetFeature {
    /// Whether this feature was injected from an alias rather than loaded
    /// from the network.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.osmid == SYNTHETIC_OSMID
    }
}

/// A district polygon, optionally limited to the years it was in force.
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictShape {
    /// District key (e.g. `"3"` for the third directorate).
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    /// First year the polygon applies to, inclusive.
    pub valid_from: Option<i32>,
    /// Last year the polygon applies to, inclusive.
    pub valid_until: Option<i32>,
}

impl DistrictShape {
    /// Whether this polygon is the current shape of its district in `year`.
    #[must_use]
    pub fn covers_year(&self, year: i32) -> bool {
        self.valid_from.is_none_or(|from| year >= from)
            && self.valid_until.is_none_or(|until| year <= until)
    }
}

/// A point standing in for a district that has no polygon for some year
/// (e.g. a directorate that was later merged away).
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalDistrictPoint {
    pub name: String,
    pub point: Point<f64>,
}

/// A manual correction for a street name.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasEntry {
    /// The street is missing from the network; inject a synthetic point
    /// feature at these coordinates under the alias name.
    Point(Point<f64>),
    /// Look the name up as if it were this other name instead.
    Name(String),
}

/// Where the street-resolution inputs live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreetDataPaths {
    /// Street network `GeoJSON` `FeatureCollection` with `name` and
    /// `osmid` properties.
    #[serde(default = "default_streets")]
    pub streets: PathBuf,

    /// District polygon `GeoJSON` `FeatureCollection`.
    #[serde(default = "default_districts")]
    pub districts: PathBuf,

    /// Property holding the district key in the district collection.
    #[serde(default = "default_district_name_property")]
    pub district_name_property: String,

    /// JSON object mapping a street name to either `[lon, lat]` or another
    /// street name.
    #[serde(default = "default_aliases")]
    pub aliases: Option<PathBuf>,

    /// JSON object mapping a district key to `[lon, lat]`.
    #[serde(default)]
    pub historical_districts: Option<PathBuf>,
}

fn default_streets() -> PathBuf {
    PathBuf::from("geo/berlin_streets.geojson")
}

fn default_districts() -> PathBuf {
    PathBuf::from("geo/polizeidirektionen.geojson")
}

fn default_district_name_property() -> String {
    "spatial_name".to_owned()
}

#[allow(clippy::unnecessary_wraps)]
fn default_aliases() -> Option<PathBuf> {
    Some(PathBuf::from("geo/missing_mapping.json"))
}

impl Default for StreetDataPaths {
    fn default() -> Self {
        Self {
            streets: default_streets(),
            districts: default_districts(),
            district_name_property: default_district_name_property(),
            aliases: default_aliases(),
            historical_districts: None,
        }
    }
}
