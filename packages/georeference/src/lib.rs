#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Georeferencing of parsed accident records.
//!
//! An accident row names one street, or several streets separated by
//! `" / "` when it happened at an intersection. [`GeoReferencer`] resolves
//! each name through the [`StreetIndex`] and reduces the matched features
//! to one representative point:
//!
//! - no match: no point
//! - one feature named once: the point of the street nearest its centroid
//! - one feature named several ways: the feature centroid
//! - several features: the centroid of the midpoints between the closest
//!   points of each consecutive pair of features
//!
//! The last case approximates an intersection; the streets are not
//! actually intersected.

pub mod reports;

use accident_map_accident_models::{
    AccidentRecord, FeatureId, GeoreferencedAccident, ResolvedAccident, UnmatchedCounter,
};
use accident_map_spatial::{SpatialError, SpatialQuery};
use accident_map_street_index::{ResolveError, StreetIndex};
use accident_map_table::TableError;
use geo::{Centroid, Geometry, MultiPoint, Point};

/// Separator between street names in one accident row.
pub const STREET_SEPARATOR: &str = " / ";

/// Errors that stop georeferencing.
#[derive(Debug, thiserror::Error)]
pub enum GeoreferenceError {
    /// A street name could not be resolved unambiguously.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The spatial backend failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The upstream table could not be parsed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Splits an accident's street field into individual street names.
///
/// Names are trimmed, empty names dropped, and repeats removed keeping the
/// first occurrence.
#[must_use]
pub fn split_streets(raw: &str) -> Vec<String> {
    let mut streets: Vec<String> = Vec::new();
    for part in raw.split(STREET_SEPARATOR).map(str::trim) {
        if !part.is_empty() && !streets.iter().any(|s| s == part) {
            streets.push(part.to_owned());
        }
    }
    streets
}

/// Resolves accident streets to a representative point.
#[derive(Clone, Copy)]
pub struct GeoReferencer<'a> {
    index: &'a StreetIndex,
    spatial: &'a dyn SpatialQuery,
}

impl<'a> GeoReferencer<'a> {
    #[must_use]
    pub const fn new(index: &'a StreetIndex, spatial: &'a dyn SpatialQuery) -> Self {
        Self { index, spatial }
    }

    #[must_use]
    pub const fn index(&self) -> &'a StreetIndex {
        self.index
    }

    #[must_use]
    pub const fn spatial(&self) -> &'a dyn SpatialQuery {
        self.spatial
    }

    /// Resolves `streets` and computes their representative point.
    ///
    /// Every name without a match is recorded in `unmatched`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoreferenceError::Resolve`] if a name is ambiguous or the
    /// district is unknown, and [`GeoreferenceError::Spatial`] if the
    /// spatial backend cannot handle a matched geometry.
    pub fn georeference(
        &self,
        streets: Vec<String>,
        district: Option<&str>,
        year: i32,
        unmatched: &mut UnmatchedCounter,
    ) -> Result<ResolvedAccident, GeoreferenceError> {
        let mut feature_ids: Vec<FeatureId> = Vec::with_capacity(streets.len());
        for street in &streets {
            if let Some(id) = self.index.resolve(street, district, year, unmatched)?
                && !feature_ids.contains(&id)
            {
                feature_ids.push(id);
            }
        }

        let center = self.center(&feature_ids, streets.len())?;

        Ok(ResolvedAccident {
            streets,
            feature_ids,
            center,
        })
    }

    /// Georeferences one parsed record.
    ///
    /// # Errors
    ///
    /// See [`Self::georeference`].
    pub fn georeference_record(
        &self,
        record: AccidentRecord,
        unmatched: &mut UnmatchedCounter,
    ) -> Result<GeoreferencedAccident, GeoreferenceError> {
        let district = record.district_name();
        if district.is_none() {
            log::warn!(
                "{}: {:?} has no directorate; resolving without district",
                record.year,
                record.street_raw
            );
        }

        let resolved = self.georeference(
            split_streets(&record.street_raw),
            district.as_deref(),
            record.year,
            unmatched,
        )?;

        Ok(GeoreferencedAccident { record, resolved })
    }

    /// Lazily georeferences a stream of parsed records.
    ///
    /// The returned iterator yields the first error it meets and then ends.
    pub fn records<'u, I, E>(
        self,
        records: I,
        unmatched: &'u mut UnmatchedCounter,
    ) -> GeoreferencedRecords<'a, 'u, I>
    where
        I: Iterator<Item = Result<AccidentRecord, E>>,
        GeoreferenceError: From<E>,
    {
        GeoreferencedRecords {
            referencer: self,
            records,
            unmatched,
            finished: false,
        }
    }

    fn center(
        &self,
        feature_ids: &[FeatureId],
        street_count: usize,
    ) -> Result<Option<Point<f64>>, SpatialError> {
        match feature_ids {
            [] => Ok(None),
            [only] => {
                let geometry = self.geometry(*only);
                let centroid = geometry.centroid().ok_or(SpatialError::EmptyGeometry)?;
                if street_count > 1 {
                    return Ok(Some(centroid));
                }
                let (on_street, _) = self
                    .spatial
                    .closest_points(geometry, &Geometry::Point(centroid))?;
                Ok(Some(on_street))
            }
            many => {
                let mut midpoints = Vec::with_capacity(many.len() - 1);
                for pair in many.windows(2) {
                    let (on_a, on_b) = self
                        .spatial
                        .closest_points(self.geometry(pair[0]), self.geometry(pair[1]))?;
                    midpoints.push(Point::new(
                        (on_a.x() + on_b.x()) / 2.0,
                        (on_a.y() + on_b.y()) / 2.0,
                    ));
                }
                Ok(MultiPoint(midpoints).centroid())
            }
        }
    }

    fn geometry(&self, id: FeatureId) -> &'a Geometry<f64> {
        &self.index.features()[id].geometry
    }
}

/// Iterator returned by [`GeoReferencer::records`].
pub struct GeoreferencedRecords<'a, 'u, I> {
    referencer: GeoReferencer<'a>,
    records: I,
    unmatched: &'u mut UnmatchedCounter,
    finished: bool,
}

impl<I, E> Iterator for GeoreferencedRecords<'_, '_, I>
where
    I: Iterator<Item = Result<AccidentRecord, E>>,
    GeoreferenceError: From<E>,
{
    type Item = Result<GeoreferencedAccident, GeoreferenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = match self.records.next()? {
            Ok(record) => self.referencer.georeference_record(record, self.unmatched),
            Err(e) => Err(e.into()),
        };

        if result.is_err() {
            self.finished = true;
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use accident_map_spatial::PlanarSpatialQuery;
    use accident_map_street_index::normalize;
    use accident_map_street_models::{DistrictShape, StreetFeature};
    use accident_map_table::{TableLayout, parse_rows};
    use geo::{Distance, Euclidean, MultiPolygon, line_string, point, polygon};

    use super::*;

    const EPS: f64 = 1e-9;

    fn street(name: &str, geometry: Geometry<f64>) -> StreetFeature {
        StreetFeature {
            id: 0,
            name: name.to_owned(),
            osmid: 0,
            geometry,
        }
    }

    fn district(name: &str, x0: f64, y0: f64) -> DistrictShape {
        DistrictShape {
            name: name.to_owned(),
            geometry: MultiPolygon(vec![polygon![
                (x: x0, y: y0),
                (x: x0 + 0.2, y: y0),
                (x: x0 + 0.2, y: y0 + 0.1),
                (x: x0, y: y0 + 0.1),
            ]]),
            valid_from: None,
            valid_until: None,
        }
    }

    fn index() -> StreetIndex {
        let mut network = vec![
            // Bent, so its centroid lies off the street.
            street(
                "Torstraße",
                Geometry::LineString(line_string![
                    (x: 13.40, y: 52.53),
                    (x: 13.42, y: 52.53),
                    (x: 13.42, y: 52.54),
                ]),
            ),
            street(
                "Rosenthaler Straße",
                Geometry::LineString(line_string![(x: 13.41, y: 52.52), (x: 13.41, y: 52.54)]),
            ),
            street(
                "Hauptstraße",
                Geometry::LineString(line_string![(x: 13.35, y: 52.55), (x: 13.36, y: 52.55)]),
            ),
            street(
                "Hauptstraße",
                Geometry::LineString(line_string![(x: 13.65, y: 52.45), (x: 13.66, y: 52.45)]),
            ),
        ];
        for (osmid, feature) in (100..).zip(network.iter_mut()) {
            feature.osmid = osmid;
        }

        StreetIndex::new(
            network,
            vec![district("1", 13.3, 52.5), district("2", 13.6, 52.4)],
            &BTreeMap::new(),
            Vec::new(),
        )
    }

    fn names(raw: &str) -> Vec<String> {
        split_streets(raw)
    }

    #[test]
    fn splits_and_dedupes_street_names() {
        assert_eq!(
            split_streets(" TORSTR /  ROSENTHALER STR / TORSTR"),
            vec!["TORSTR".to_owned(), "ROSENTHALER STR".to_owned()]
        );
        assert_eq!(split_streets("A/B"), vec!["A/B".to_owned()]);
        assert!(split_streets("  ").is_empty());
    }

    #[test]
    fn single_street_center_lies_on_the_street() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let resolved = referencer
            .georeference(names("TORSTR"), Some("1"), 2012, &mut unmatched)
            .unwrap();

        assert_eq!(resolved.feature_ids, vec![0]);
        let center = resolved.center.unwrap();
        let on_street = Euclidean.distance(&index.features()[0].geometry, &Geometry::Point(center));
        assert!(on_street < EPS, "{center:?} is {on_street} off the street");
        assert!((center.y() - 52.53).abs() < EPS);
    }

    #[test]
    fn one_feature_named_twice_uses_its_centroid() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let resolved = referencer
            .georeference(names("TORSTR / Torstraße"), Some("1"), 2012, &mut unmatched)
            .unwrap();

        assert_eq!(resolved.feature_ids, vec![0]);
        let expected = index.features()[0].geometry.centroid().unwrap();
        assert_eq!(resolved.center, Some(expected));
        assert!(unmatched.is_empty());
    }

    #[test]
    fn intersection_center_is_the_crossing() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let resolved = referencer
            .georeference(names("TORSTR / ROSENTHALER STR."), Some("1"), 2012, &mut unmatched)
            .unwrap();

        assert_eq!(resolved.feature_ids, vec![0, 1]);
        let center = resolved.center.unwrap();
        assert!(Euclidean.distance(center, point!(x: 13.41, y: 52.53)) < EPS);
    }

    #[test]
    fn unresolved_names_give_no_center_and_are_counted() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let resolved = referencer
            .georeference(names("NIRGENDWO / UNBEKANNTWEG"), Some("1"), 2012, &mut unmatched)
            .unwrap();

        assert!(!resolved.is_matched());
        assert_eq!(resolved.center, None);
        assert_eq!(unmatched.total(), 2);
        assert_eq!(unmatched.get("NIRGENDWO"), 1);
        assert_eq!(unmatched.get("UNBEKANNTWEG"), 1);
    }

    #[test]
    fn partially_matched_intersection_uses_the_matched_street() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let resolved = referencer
            .georeference(names("ROSENTHALER STR / NIRGENDWO"), Some("1"), 2012, &mut unmatched)
            .unwrap();

        assert_eq!(resolved.feature_ids, vec![1]);
        let center = resolved.center.unwrap();
        assert!(Euclidean.distance(center, point!(x: 13.41, y: 52.53)) < EPS);
        assert_eq!(unmatched.get("NIRGENDWO"), 1);
    }

    #[test]
    fn district_picks_between_same_named_streets() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let east = referencer
            .georeference(names("HAUPTSTR"), Some("2"), 2012, &mut unmatched)
            .unwrap();
        assert_eq!(east.feature_ids, vec![3]);

        let err = referencer
            .georeference(names("HAUPTSTR"), None, 2012, &mut unmatched)
            .unwrap_err();
        assert!(matches!(
            err,
            GeoreferenceError::Resolve(ResolveError::AmbiguousMatch { candidates: 2, .. })
        ));
    }

    #[test]
    fn record_stream_stops_at_the_first_error() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let record = |street: &str, directorate: Option<u32>| AccidentRecord {
            year: 2012,
            directorate,
            street_raw: street.to_owned(),
            count: 1,
        };
        let input = vec![
            Ok::<_, GeoreferenceError>(record("TORSTR", Some(1))),
            Ok(record("HAUPTSTR", Some(9))),
            Ok(record("ROSENTHALER STR", Some(1))),
        ];

        let results: Vec<_> = referencer.records(input.into_iter(), &mut unmatched).collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(GeoreferenceError::Resolve(ResolveError::MissingDistrict { .. }))
        ));
    }

    #[test]
    fn parsed_table_resolves_end_to_end() {
        let index = index();
        let referencer = GeoReferencer::new(&index, &PlanarSpatialQuery);
        let mut unmatched = UnmatchedCounter::new();

        let rows: Vec<Vec<String>> = vec![
            vec!["1".into(), String::new(), String::new()],
            vec![String::new(), String::new(), "TORSTR".into(), "5".into()],
        ];
        let layout = TableLayout::default().compile().unwrap();
        let records = parse_rows(rows, &layout, 2012).unwrap();

        let accidents: Vec<GeoreferencedAccident> = referencer
            .records(records.into_iter().map(Ok::<_, TableError>), &mut unmatched)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(accidents.len(), 1);
        let accident = &accidents[0];
        assert_eq!(accident.record.count, 5);
        assert_eq!(accident.record.directorate, Some(1));
        assert!(accident.resolved.center.is_some());

        let feature = &index.features()[accident.resolved.feature_ids[0]];
        assert_eq!(normalize(&feature.name), normalize("TORSTR"));
        assert!(unmatched.is_empty());
    }
}
