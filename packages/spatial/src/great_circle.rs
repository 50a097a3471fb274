//! Great-circle distance on a spherical Earth.
//!
//! Uses the spherical law of cosines. Rounding can push the cosine a hair
//! outside `[-1, 1]` for (near-)identical points; those pairs get
//! [`OUT_OF_DOMAIN_KM`] instead of `NaN`, so a degenerate duplicate point
//! can never poison a minimum-distance search.

use geo::Coord;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance reported when the arc-cosine argument leaves its domain.
pub const OUT_OF_DOMAIN_KM: f64 = 10_000.0;

/// Distance in kilometers between two lon/lat coordinates.
#[must_use]
pub fn distance_km(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat_a = a.y.to_radians();
    let lat_b = b.y.to_radians();
    let delta_lng = (b.x - a.x).to_radians();

    arc_km(lat_a.sin().mul_add(
        lat_b.sin(),
        lat_a.cos() * lat_b.cos() * delta_lng.cos(),
    ))
}

fn arc_km(cos_angle: f64) -> f64 {
    let angle = cos_angle.acos();
    if angle.is_nan() {
        OUT_OF_DOMAIN_KM
    } else {
        angle * EARTH_RADIUS_KM
    }
}

#[cfg(test)]
mod tests {
    use geo::coord;

    use super::*;

    #[test]
    fn hundredth_of_a_degree_of_latitude() {
        let d = distance_km(coord!(x: 13.4, y: 52.50), coord!(x: 13.4, y: 52.51));
        assert!((d - 1.112).abs() < 0.01, "{d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = coord!(x: 13.37, y: 52.51);
        let b = coord!(x: 13.45, y: 52.48);
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn out_of_domain_cosine_maps_to_sentinel() {
        assert!((arc_km(1.0 + 1e-12) - OUT_OF_DOMAIN_KM).abs() < f64::EPSILON);
        assert!((arc_km(-1.0 - 1e-12) - OUT_OF_DOMAIN_KM).abs() < f64::EPSILON);
        assert!(arc_km(1.0).abs() < f64::EPSILON);
    }
}
