//! Loaders for the street network, districts, aliases, and historical
//! district points.
//!
//! The street network and districts are `GeoJSON` `FeatureCollection`s.
//! Aliases and historical points are plain JSON objects keyed by name.

use std::collections::BTreeMap;
use std::path::Path;

use accident_map_street_models::{
    AliasEntry, DistrictShape, HistoricalDistrictPoint, StreetDataPaths, StreetFeature,
};
use geo::{Geometry, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde::Deserialize;

use crate::{StreetIndex, StreetIndexError};

/// Property names checked, in order, for a feature's OSM id.
const OSMID_PROPERTIES: [&str; 2] = ["osmid", "osm_id"];

/// An alias value as written in the alias file: `[lon, lat]` or a name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAlias {
    Point([f64; 2]),
    Name(String),
}

impl From<RawAlias> for AliasEntry {
    fn from(raw: RawAlias) -> Self {
        match raw {
            RawAlias::Point([x, y]) => Self::Point(Point::new(x, y)),
            RawAlias::Name(name) => Self::Name(name),
        }
    }
}

impl StreetIndex {
    /// Loads every input named in `paths` and builds the index.
    ///
    /// # Errors
    ///
    /// Returns [`StreetIndexError`] if any input cannot be read or parsed.
    pub fn load(paths: &StreetDataPaths) -> Result<Self, StreetIndexError> {
        let streets = load_streets(&paths.streets)?;
        let districts = load_districts(&paths.districts, &paths.district_name_property)?;
        let aliases = paths
            .aliases
            .as_deref()
            .map(load_aliases)
            .transpose()?
            .unwrap_or_default();
        let historical = paths
            .historical_districts
            .as_deref()
            .map(load_historical_districts)
            .transpose()?
            .unwrap_or_default();

        Ok(Self::new(streets, districts, &aliases, historical))
    }
}

/// Reads a `GeoJSON` file that must hold a `FeatureCollection`.
fn read_feature_collection(path: &Path) -> Result<FeatureCollection, StreetIndexError> {
    let text = std::fs::read_to_string(path)?;
    parse_feature_collection(&text, path)
}

fn parse_feature_collection(text: &str, path: &Path) -> Result<FeatureCollection, StreetIndexError> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        _ => Err(StreetIndexError::NotFeatureCollection {
            path: path.display().to_string(),
        }),
    }
}

/// Loads the street network.
///
/// Features without a name or geometry are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a
/// `FeatureCollection`, or holds a geometry `geo` cannot represent.
pub fn load_streets(path: &Path) -> Result<Vec<StreetFeature>, StreetIndexError> {
    let collection = read_feature_collection(path)?;
    let streets = streets_from_collection(collection)?;
    log::info!("Loaded {} street features from {}", streets.len(), path.display());
    Ok(streets)
}

fn streets_from_collection(
    collection: FeatureCollection,
) -> Result<Vec<StreetFeature>, StreetIndexError> {
    let total = collection.features.len();
    let mut streets = Vec::with_capacity(total);

    for feature in collection.features {
        let Some(name) = string_property(&feature, "name") else {
            continue;
        };
        let osmid = OSMID_PROPERTIES
            .iter()
            .find_map(|key| feature.property(key).and_then(integer_value))
            .unwrap_or(0);
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: Geometry<f64> = geometry.try_into()?;

        streets.push(StreetFeature {
            id: streets.len(),
            name,
            osmid,
            geometry,
        });
    }

    if streets.len() < total {
        log::debug!("Skipped {} unnamed or empty street features", total - streets.len());
    }

    Ok(streets)
}

/// Loads district polygons keyed by `name_property`.
///
/// Optional `valid_from` / `valid_until` integer properties limit a
/// polygon to a range of years.
///
/// # Errors
///
/// Returns [`StreetIndexError::InvalidFeature`] for a feature without a
/// name or without a (multi)polygon geometry.
pub fn load_districts(
    path: &Path,
    name_property: &str,
) -> Result<Vec<DistrictShape>, StreetIndexError> {
    let collection = read_feature_collection(path)?;
    let districts = districts_from_collection(collection, name_property, path)?;
    log::info!("Loaded {} district polygons from {}", districts.len(), path.display());
    Ok(districts)
}

fn districts_from_collection(
    collection: FeatureCollection,
    name_property: &str,
    path: &Path,
) -> Result<Vec<DistrictShape>, StreetIndexError> {
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let invalid = |reason: &str| StreetIndexError::InvalidFeature {
                path: path.display().to_string(),
                index,
                reason: reason.to_owned(),
            };

            let name = string_property(&feature, name_property)
                .ok_or_else(|| invalid(&format!("missing {name_property:?} property")))?;
            let valid_from = year_property(&feature, "valid_from");
            let valid_until = year_property(&feature, "valid_until");

            let geometry = feature
                .geometry
                .ok_or_else(|| invalid("missing geometry"))?;
            let geometry = match Geometry::<f64>::try_from(geometry)? {
                Geometry::MultiPolygon(mp) => mp,
                Geometry::Polygon(p) => MultiPolygon(vec![p]),
                _ => return Err(invalid("geometry is not a Polygon or MultiPolygon")),
            };

            Ok(DistrictShape {
                name,
                geometry,
                valid_from,
                valid_until,
            })
        })
        .collect()
}

/// Loads the alias file: `{"name": [lon, lat] | "other name", ...}`.
///
/// # Errors
///
/// Returns [`StreetIndexError::Json`] if the file is not such an object.
pub fn load_aliases(path: &Path) -> Result<BTreeMap<String, AliasEntry>, StreetIndexError> {
    let text = std::fs::read_to_string(path)?;
    let aliases = parse_aliases(&text)?;
    log::info!("Loaded {} street aliases from {}", aliases.len(), path.display());
    Ok(aliases)
}

fn parse_aliases(text: &str) -> Result<BTreeMap<String, AliasEntry>, StreetIndexError> {
    let raw: BTreeMap<String, RawAlias> = serde_json::from_str(text)?;
    Ok(raw
        .into_iter()
        .map(|(name, alias)| (name, alias.into()))
        .collect())
}

/// Loads historical district points: `{"district": [lon, lat], ...}`.
///
/// # Errors
///
/// Returns [`StreetIndexError::Json`] if the file is not such an object.
pub fn load_historical_districts(
    path: &Path,
) -> Result<Vec<HistoricalDistrictPoint>, StreetIndexError> {
    let text = std::fs::read_to_string(path)?;
    let points = parse_historical_districts(&text)?;
    log::info!("Loaded {} historical district points from {}", points.len(), path.display());
    Ok(points)
}

fn parse_historical_districts(
    text: &str,
) -> Result<Vec<HistoricalDistrictPoint>, StreetIndexError> {
    let raw: BTreeMap<String, [f64; 2]> = serde_json::from_str(text)?;
    Ok(raw
        .into_iter()
        .map(|(name, [x, y])| HistoricalDistrictPoint {
            name,
            point: Point::new(x, y),
        })
        .collect())
}

/// A string or number property rendered as a trimmed, non-empty string.
fn string_property(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        serde_json::Value::String(s) => Some(s.trim().to_owned()).filter(|s| !s.is_empty()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer_value(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn year_property(feature: &Feature, key: &str) -> Option<i32> {
    feature
        .property(key)
        .and_then(integer_value)
        .and_then(|year| i32::try_from(year).ok())
}
