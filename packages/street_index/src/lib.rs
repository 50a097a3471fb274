#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street-name index over a city's street network.
//!
//! # Architecture
//!
//! - **Build time**: network features are loaded once, point aliases are
//!   appended as synthetic point features, and every feature name is
//!   canonicalized with [`normalize::normalize`] into a name → feature-id
//!   table. Name aliases become a redirect table between canonical names.
//! - **Query time**: the raw name is canonicalized the same way and looked
//!   up. A name shared by several features (a "Hauptstraße" in every
//!   borough) is disambiguated by distance to the accident's district,
//!   using the district polygon for the year or, failing that, a
//!   historical district point.
//!
//! Feature ids are positions in the feature array and never change once
//! the index is built.

pub mod load;
pub mod normalize;

use std::collections::BTreeMap;

use accident_map_accident_models::{FeatureId, UnmatchedCounter};
use accident_map_street_models::{
    AliasEntry, DistrictShape, HistoricalDistrictPoint, SYNTHETIC_OSMID, StreetFeature,
};
use geo::{Distance, Euclidean, Geometry, Point};

pub use load::{load_aliases, load_districts, load_historical_districts, load_streets};
pub use normalize::normalize;

/// Errors from loading street-resolution inputs.
#[derive(Debug, thiserror::Error)]
pub enum StreetIndexError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON input could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A `GeoJSON` input could not be parsed or converted.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A `GeoJSON` input was valid but not a `FeatureCollection`.
    #[error("{path}: expected a GeoJSON FeatureCollection")]
    NotFeatureCollection { path: String },

    /// A feature could not be turned into a district.
    #[error("{path}: feature {index}: {reason}")]
    InvalidFeature {
        path: String,
        index: usize,
        reason: String,
    },
}

/// Fatal resolution failures.
///
/// A name with no candidates is not an error; it is tallied in the
/// caller's [`UnmatchedCounter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The district has neither a polygon for the year nor a historical
    /// point.
    #[error("Missing district {district:?} for {year}")]
    MissingDistrict { district: String, year: i32 },

    /// Several features share the name and there is no district to pick
    /// between them.
    #[error("Street {name:?} matches {candidates} features but no district was given")]
    AmbiguousMatch { name: String, candidates: usize },
}

/// The shape a district is measured from when disambiguating candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum DistrictReference<'a> {
    /// The district polygon in force for the year.
    Polygon(&'a DistrictShape),
    /// A stand-in point for a district without a polygon.
    HistoricalPoint(Point<f64>),
}

impl DistrictReference<'_> {
    #[must_use]
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            Self::Polygon(shape) => Geometry::MultiPolygon(shape.geometry.clone()),
            Self::HistoricalPoint(point) => Geometry::Point(*point),
        }
    }
}

/// Name → feature lookup over the street network.
#[derive(Debug)]
pub struct StreetIndex {
    features: Vec<StreetFeature>,
    names: BTreeMap<String, Vec<FeatureId>>,
    redirects: BTreeMap<String, String>,
    districts: BTreeMap<String, Vec<DistrictShape>>,
    historical: BTreeMap<String, Point<f64>>,
}

impl StreetIndex {
    /// Builds the index.
    ///
    /// Feature ids are reassigned to array positions. Point aliases are
    /// appended after the network features in alias-name order.
    #[must_use]
    pub fn new(
        network: Vec<StreetFeature>,
        districts: Vec<DistrictShape>,
        aliases: &BTreeMap<String, AliasEntry>,
        historical: Vec<HistoricalDistrictPoint>,
    ) -> Self {
        let mut features = network;
        for (id, feature) in features.iter_mut().enumerate() {
            feature.id = id;
        }

        let mut redirects = BTreeMap::new();
        for (name, alias) in aliases {
            match alias {
                AliasEntry::Point(point) => features.push(StreetFeature {
                    id: features.len(),
                    name: name.clone(),
                    osmid: SYNTHETIC_OSMID,
                    geometry: Geometry::Point(*point),
                }),
                AliasEntry::Name(target) => {
                    let from = normalize(name);
                    let to = normalize(target);
                    if from != to {
                        redirects.insert(from, to);
                    }
                }
            }
        }

        let mut names: BTreeMap<String, Vec<FeatureId>> = BTreeMap::new();
        for feature in &features {
            let canonical = normalize(&feature.name);
            if canonical.is_empty() {
                log::debug!("Not indexing feature {} ({:?})", feature.id, feature.name);
                continue;
            }
            names.entry(canonical).or_default().push(feature.id);
        }

        let mut by_name: BTreeMap<String, Vec<DistrictShape>> = BTreeMap::new();
        for district in districts {
            by_name.entry(district.name.clone()).or_default().push(district);
        }

        log::info!(
            "Street index: {} features ({} from aliases), {} names, {} redirects, {} districts, {} historical districts",
            features.len(),
            features.iter().filter(|f| f.is_synthetic()).count(),
            names.len(),
            redirects.len(),
            by_name.len(),
            historical.len()
        );

        Self {
            features,
            names,
            redirects,
            districts: by_name,
            historical: historical.into_iter().map(|h| (h.name, h.point)).collect(),
        }
    }

    #[must_use]
    pub fn features(&self) -> &[StreetFeature] {
        &self.features
    }

    #[must_use]
    pub fn feature(&self, id: FeatureId) -> Option<&StreetFeature> {
        self.features.get(id)
    }

    /// Canonical key for `raw_name`, with name aliases applied.
    #[must_use]
    pub fn canonical_name(&self, raw_name: &str) -> String {
        let canonical = normalize(raw_name);
        self.redirects.get(&canonical).cloned().unwrap_or(canonical)
    }

    /// All features whose canonical name matches `raw_name`, in load
    /// order.
    #[must_use]
    pub fn candidates(&self, raw_name: &str) -> &[FeatureId] {
        self.names
            .get(&self.canonical_name(raw_name))
            .map_or(&[], Vec::as_slice)
    }

    /// The shape to measure candidates against for `district` in `year`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MissingDistrict`] if the district has no
    /// polygon covering `year` and no historical point.
    pub fn district_reference(
        &self,
        district: &str,
        year: i32,
    ) -> Result<DistrictReference<'_>, ResolveError> {
        if let Some(shape) = self
            .districts
            .get(district)
            .and_then(|shapes| shapes.iter().find(|s| s.covers_year(year)))
        {
            return Ok(DistrictReference::Polygon(shape));
        }

        if let Some(point) = self.historical.get(district) {
            log::trace!("District {district:?} has no polygon for {year}; using historical point");
            return Ok(DistrictReference::HistoricalPoint(*point));
        }

        Err(ResolveError::MissingDistrict {
            district: district.to_owned(),
            year,
        })
    }

    /// Resolves a raw street name to a feature.
    ///
    /// Returns `Ok(None)` and records a miss in `unmatched` when no feature
    /// carries the name.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MissingDistrict`] if `district` is given but
    /// unknown, and [`ResolveError::AmbiguousMatch`] if several features
    /// match and no district was given.
    pub fn resolve(
        &self,
        raw_name: &str,
        district: Option<&str>,
        year: i32,
        unmatched: &mut UnmatchedCounter,
    ) -> Result<Option<FeatureId>, ResolveError> {
        let reference = district
            .map(|d| self.district_reference(d, year))
            .transpose()?;

        match self.candidates(raw_name) {
            [] => {
                log::debug!("No street named {raw_name:?}");
                unmatched.record(raw_name);
                Ok(None)
            }
            [only] => Ok(Some(*only)),
            many => {
                let Some(reference) = reference else {
                    return Err(ResolveError::AmbiguousMatch {
                        name: raw_name.to_owned(),
                        candidates: many.len(),
                    });
                };
                Ok(self.closest_to(&reference, many))
            }
        }
    }

    /// The candidate nearest to the district; ties go to the lowest id.
    fn closest_to(
        &self,
        reference: &DistrictReference<'_>,
        candidates: &[FeatureId],
    ) -> Option<FeatureId> {
        let reference = reference.to_geometry();

        candidates
            .iter()
            .map(|&id| {
                let distance = Euclidean.distance(&reference, &self.features[id].geometry);
                (distance, id)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, line_string, point, polygon};

    use super::*;

    fn street(name: &str, osmid: i64, x: f64) -> StreetFeature {
        StreetFeature {
            id: 0,
            name: name.to_owned(),
            osmid,
            geometry: Geometry::LineString(line_string![(x: x, y: 0.0), (x: x, y: 1.0)]),
        }
    }

    fn district(name: &str, x0: f64, valid_until: Option<i32>) -> DistrictShape {
        DistrictShape {
            name: name.to_owned(),
            geometry: MultiPolygon(vec![polygon![
                (x: x0, y: 0.0),
                (x: x0 + 1.0, y: 0.0),
                (x: x0 + 1.0, y: 1.0),
                (x: x0, y: 1.0),
            ]]),
            valid_from: None,
            valid_until,
        }
    }

    /// Two "Hauptstraße"s, one in district 1 (x ≈ 0) and one in district 2
    /// (x ≈ 10), plus a unique "Torstraße".
    fn index() -> StreetIndex {
        StreetIndex::new(
            vec![
                street("Hauptstraße", 100, 10.5),
                street("Torstraße", 200, 5.0),
                street("Hauptstraße", 300, 0.5),
            ],
            vec![district("1", 0.0, None), district("2", 10.0, Some(2008))],
            &BTreeMap::from([
                (
                    "Geisterweg".to_owned(),
                    AliasEntry::Point(point!(x: 3.0, y: 3.0)),
                ),
                (
                    "Torstr. (alt)".to_owned(),
                    AliasEntry::Name("Torstraße".to_owned()),
                ),
                (
                    "Alte Torstrasse".to_owned(),
                    AliasEntry::Name("Torstraße".to_owned()),
                ),
            ]),
            vec![HistoricalDistrictPoint {
                name: "2".to_owned(),
                point: point!(x: 10.5, y: 0.5),
            }],
        )
    }

    #[test]
    fn unique_name_resolves_directly() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(idx.resolve("TORSTR", None, 2010, &mut unmatched), Ok(Some(1)));
        assert!(unmatched.is_empty());
    }

    #[test]
    fn unknown_name_is_counted_not_fatal() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(idx.resolve("NIRGENDWO", Some("1"), 2010, &mut unmatched), Ok(None));
        assert_eq!(idx.resolve("NIRGENDWO", Some("1"), 2010, &mut unmatched), Ok(None));
        assert_eq!(unmatched.get("NIRGENDWO"), 2);
    }

    #[test]
    fn shared_name_picks_feature_nearest_to_district() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(idx.resolve("HAUPTSTR", Some("1"), 2005, &mut unmatched), Ok(Some(2)));
        assert_eq!(idx.resolve("HAUPTSTR", Some("2"), 2005, &mut unmatched), Ok(Some(0)));
    }

    #[test]
    fn expired_polygon_falls_back_to_historical_point() {
        let idx = index();
        assert!(matches!(
            idx.district_reference("2", 2012),
            Ok(DistrictReference::HistoricalPoint(_))
        ));
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(idx.resolve("HAUPTSTR", Some("2"), 2012, &mut unmatched), Ok(Some(0)));
    }

    #[test]
    fn shared_name_without_district_is_ambiguous() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(
            idx.resolve("Hauptstr.", None, 2010, &mut unmatched),
            Err(ResolveError::AmbiguousMatch {
                name: "Hauptstr.".to_owned(),
                candidates: 2,
            })
        );
    }

    #[test]
    fn unknown_district_is_fatal_even_for_unique_names() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(
            idx.resolve("TORSTR", Some("9"), 2010, &mut unmatched),
            Err(ResolveError::MissingDistrict {
                district: "9".to_owned(),
                year: 2010,
            })
        );
    }

    #[test]
    fn ties_go_to_lowest_id() {
        let idx = StreetIndex::new(
            vec![street("Ringstraße", 1, 2.0), street("Ringstraße", 2, 2.0)],
            vec![district("1", 0.0, None)],
            &BTreeMap::new(),
            Vec::new(),
        );
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(idx.resolve("Ringstr.", Some("1"), 2010, &mut unmatched), Ok(Some(0)));
    }

    #[test]
    fn point_alias_becomes_synthetic_feature() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        let id = idx
            .resolve("GEISTERWEG", None, 2010, &mut unmatched)
            .unwrap()
            .unwrap();
        let feature = idx.feature(id).unwrap();
        assert_eq!(id, 3);
        assert!(feature.is_synthetic());
        assert_eq!(feature.geometry, Geometry::Point(point!(x: 3.0, y: 3.0)));
    }

    #[test]
    fn name_alias_redirects_to_target() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        assert_eq!(
            idx.resolve("ALTE TORSTRASSE", None, 2010, &mut unmatched),
            Ok(Some(1))
        );
        assert_eq!(idx.canonical_name("Alte Torstraße"), "torstr");
    }

    #[test]
    fn resolution_is_deterministic() {
        let idx = index();
        let mut unmatched = UnmatchedCounter::new();
        let first = idx.resolve("HAUPTSTR", Some("1"), 2005, &mut unmatched);
        for _ in 0..10 {
            assert_eq!(idx.resolve("HAUPTSTR", Some("1"), 2005, &mut unmatched), first);
        }
    }

    #[test]
    fn ids_are_array_positions() {
        let idx = index();
        for (position, feature) in idx.features().iter().enumerate() {
            assert_eq!(feature.id, position);
        }
    }
}
