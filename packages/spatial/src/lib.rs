#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial queries used while georeferencing accidents.
//!
//! Georeferencing only ever needs two operations from a spatial backend:
//! the pair of mutually closest points between two geometries, and the
//! geodesic length of a geometry. [`SpatialQuery`] is that boundary.
//! [`PlanarSpatialQuery`] answers both in-process with `geo`.
//!
//! The [`great_circle`] module holds the spherical distance used when
//! clustering street segments.

pub mod great_circle;

use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Closest, ClosestPoint, CoordsIter, Distance, Euclidean, Geodesic, Geometry, Length, Line,
    Point,
};

/// Errors from spatial queries.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// One of the geometries has no coordinates.
    #[error("Geometry has no coordinates")]
    EmptyGeometry,

    /// The query is not defined for this geometry type.
    #[error("Unsupported geometry type for {operation}: {geometry}")]
    UnsupportedGeometry {
        operation: &'static str,
        geometry: &'static str,
    },
}

/// The spatial backend georeferencing delegates to.
pub trait SpatialQuery {
    /// Returns `(on_a, on_b)`: the point of `a` closest to `b` and the
    /// point of `b` closest to `a`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyGeometry`] if either geometry has no
    /// coordinates.
    fn closest_points(
        &self,
        a: &Geometry<f64>,
        b: &Geometry<f64>,
    ) -> Result<(Point<f64>, Point<f64>), SpatialError>;

    /// Geodesic length of a linear geometry in meters.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnsupportedGeometry`] for areal geometries.
    fn geodesic_length(&self, geometry: &Geometry<f64>) -> Result<f64, SpatialError>;
}

/// In-process [`SpatialQuery`] over lon/lat coordinates.
///
/// Closest points are computed in the coordinate plane, matching what a
/// `PostGIS` `ST_ClosestPoint` on `geometry` columns returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarSpatialQuery;

impl SpatialQuery for PlanarSpatialQuery {
    fn closest_points(
        &self,
        a: &Geometry<f64>,
        b: &Geometry<f64>,
    ) -> Result<(Point<f64>, Point<f64>), SpatialError> {
        if let Some(crossing) = first_crossing(a, b) {
            log::trace!("{} and {} cross at {crossing:?}", geometry_type(a), geometry_type(b));
            return Ok((crossing, crossing));
        }

        // Without a crossing, the closest pair between two polylines always
        // has a vertex of one of them as an endpoint.
        let mut best: Option<(f64, Point<f64>, Point<f64>)> = None;
        let mut consider = |on_a: Point<f64>, on_b: Point<f64>| {
            let d = Euclidean.distance(on_a, on_b);
            if best.is_none_or(|(best_d, _, _)| d < best_d) {
                best = Some((d, on_a, on_b));
            }
        };

        for coord in b.coords_iter() {
            let vertex = Point::from(coord);
            if let Some(on_a) = closest_on(a, &vertex) {
                consider(on_a, vertex);
            }
        }
        for coord in a.coords_iter() {
            let vertex = Point::from(coord);
            if let Some(on_b) = closest_on(b, &vertex) {
                consider(vertex, on_b);
            }
        }

        best.map(|(_, on_a, on_b)| (on_a, on_b))
            .ok_or(SpatialError::EmptyGeometry)
    }

    fn geodesic_length(&self, geometry: &Geometry<f64>) -> Result<f64, SpatialError> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Ok(0.0),
            Geometry::Line(line) => Ok(Geodesic.length(line)),
            Geometry::LineString(ls) => Ok(Geodesic.length(ls)),
            Geometry::MultiLineString(mls) => Ok(Geodesic.length(mls)),
            other => Err(SpatialError::UnsupportedGeometry {
                operation: "geodesic_length",
                geometry: geometry_type(other),
            }),
        }
    }
}

/// Closest point of `geometry` to `point`, if one is defined.
fn closest_on(geometry: &Geometry<f64>, point: &Point<f64>) -> Option<Point<f64>> {
    match geometry.closest_point(point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(p),
        Closest::Indeterminate => None,
    }
}

/// The first point where a segment of `a` touches a segment of `b`.
fn first_crossing(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Point<f64>> {
    let segments_b = segments(b);
    if segments_b.is_empty() {
        return None;
    }

    for seg_a in segments(a) {
        for seg_b in &segments_b {
            match line_intersection(seg_a, *seg_b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    return Some(intersection.into());
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    return Some(intersection.start.into());
                }
                None => {}
            }
        }
    }

    None
}

/// All straight segments of a geometry's linework.
fn segments(geometry: &Geometry<f64>) -> Vec<Line<f64>> {
    match geometry {
        Geometry::Line(line) => vec![*line],
        Geometry::LineString(ls) => ls.lines().collect(),
        Geometry::MultiLineString(mls) => mls.0.iter().flat_map(|ls| ls.lines()).collect(),
        Geometry::Polygon(polygon) => std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .flat_map(|ring| ring.lines())
            .collect(),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
            .flat_map(|ring| ring.lines())
            .collect(),
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(segments).collect(),
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => Vec::new(),
    }
}

/// Human-readable geometry type name for error messages.
#[must_use]
pub const fn geometry_type(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use geo::{line_string, point, polygon};

    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_point_eq(actual: Point<f64>, expected: Point<f64>) {
        assert!(
            (actual.x() - expected.x()).abs() < EPS && (actual.y() - expected.y()).abs() < EPS,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn crossing_lines_meet_at_their_intersection() {
        let a = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0)]);
        let b = Geometry::LineString(line_string![(x: 0.0, y: 2.0), (x: 2.0, y: 0.0)]);
        let (on_a, on_b) = PlanarSpatialQuery.closest_points(&a, &b).unwrap();
        assert_point_eq(on_a, point!(x: 1.0, y: 1.0));
        assert_point_eq(on_b, point!(x: 1.0, y: 1.0));
    }

    #[test]
    fn disjoint_lines_use_nearest_vertex() {
        let a = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0)]);
        let b = Geometry::LineString(line_string![(x: 2.0, y: 1.0), (x: 2.0, y: 3.0)]);
        let (on_a, on_b) = PlanarSpatialQuery.closest_points(&a, &b).unwrap();
        assert_point_eq(on_a, point!(x: 2.0, y: 0.0));
        assert_point_eq(on_b, point!(x: 2.0, y: 1.0));
    }

    #[test]
    fn point_to_line_projects_onto_line() {
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0)]);
        let p = Geometry::Point(point!(x: 1.5, y: 2.0));
        let (on_line, on_point) = PlanarSpatialQuery.closest_points(&line, &p).unwrap();
        assert_point_eq(on_line, point!(x: 1.5, y: 0.0));
        assert_point_eq(on_point, point!(x: 1.5, y: 2.0));
    }

    #[test]
    fn geodesic_length_of_a_degree_of_latitude() {
        let ls = Geometry::LineString(line_string![(x: 13.0, y: 52.0), (x: 13.0, y: 53.0)]);
        let meters = PlanarSpatialQuery.geodesic_length(&ls).unwrap();
        assert!((meters - 111_250.0).abs() < 500.0, "{meters}");
    }

    #[test]
    fn geodesic_length_rejects_polygons() {
        let poly = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]);
        assert!(matches!(
            PlanarSpatialQuery.geodesic_length(&poly),
            Err(SpatialError::UnsupportedGeometry {
                geometry: "Polygon",
                ..
            })
        ));
    }
}
