//! Great-circle geometry helpers shared by the feature engines and the
//! geofence machine. All angles in degrees, all distances in meters.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two WGS84 points, in meters.
///
/// Symmetric, zero for identical points. The square-root argument is clamped
/// to [0, 1] so near-identical and near-antipodal pairs stay finite.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (la1, la2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + la1.cos() * la2.cos() * (dlon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Initial great-circle bearing from point 1 to point 2, degrees in [0, 360).
///
/// Coincident points have no defined bearing; this returns 0.0 for them.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (la1, la2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();

    let y = dlon.sin() * la2.cos();
    let x = la1.cos() * la2.sin() - la1.sin() * la2.cos() * dlon.cos();
    let deg = y.atan2(x).to_degrees();
    deg.rem_euclid(360.0)
}

/// Shortest signed angular difference `a - b`, degrees in (-180, 180].
pub fn angular_diff_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_zero_for_identical_points() {
        assert_eq!(distance_m(41.0, 29.0, 41.0, 29.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = distance_m(41.015137, 28.979530, 41.1, 29.1);
        let d2 = distance_m(41.1, 29.1, 41.015137, 28.979530);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn distance_one_degree_latitude() {
        // One degree of latitude is ~111.19 km on a 6371 km sphere.
        let d = distance_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn distance_antipodal_is_half_circumference() {
        let d = distance_m(0.0, 0.0, 0.0, 180.0);
        let half = std::f64::consts::PI * 6_371_000.0;
        assert!((d - half).abs() < 1.0, "got {d}");
        assert!(d.is_finite());
    }

    #[test]
    fn bearing_cardinal_directions() {
        assert!((bearing_deg(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-6); // north
        assert!((bearing_deg(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-6); // east
        assert!((bearing_deg(1.0, 0.0, 0.0, 0.0) - 180.0).abs() < 1e-6); // south
        assert!((bearing_deg(0.0, 1.0, 0.0, 0.0) - 270.0).abs() < 1e-6); // west
    }

    #[test]
    fn bearing_coincident_points_is_zero() {
        assert_eq!(bearing_deg(41.0, 29.0, 41.0, 29.0), 0.0);
    }

    #[test]
    fn angular_diff_wraps_across_north() {
        assert!((angular_diff_deg(1.0, 359.0) - 2.0).abs() < 1e-9);
        assert!((angular_diff_deg(359.0, 1.0) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn angular_diff_range() {
        assert_eq!(angular_diff_deg(180.0, 0.0), 180.0);
        assert_eq!(angular_diff_deg(0.0, 180.0), 180.0);
        assert!((angular_diff_deg(270.0, 0.0) + 90.0).abs() < 1e-9);
    }
}
