//! Great-circle geometry for the mining geofence.
//!
//! Admission trusts the coordinates the client reports; this module only
//! answers whether those coordinates fall inside a site's radius. Anything
//! malformed (non-finite values, out-of-range degrees, a bad radius) is
//! treated as outside.

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// Haversine distance between two coordinates, in meters.
///
/// Returns NaN when either coordinate is invalid; NaN fails every radius
/// comparison, so callers stay closed by default.
pub fn haversine_distance_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    if !valid_coordinates(lat1, lng1) || !valid_coordinates(lat2, lng2) {
        return f64::NAN;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lng2 - lng1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Inclusive geofence test: a distance exactly equal to the radius admits.
pub fn within_radius(lat1: f64, lng1: f64, lat2: f64, lng2: f64, radius_meters: f64) -> bool {
    if !radius_meters.is_finite() || radius_meters < 0.0 {
        return false;
    }
    // NaN distance compares false here, which is the closed default.
    haversine_distance_meters(lat1, lng1, lat2, lng2) <= radius_meters
}

pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (MIN_LATITUDE..=MAX_LATITUDE).contains(&lat)
        && (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equator_millidegree_distance() {
        // One millidegree of latitude is 111.19m on this sphere.
        let distance = haversine_distance_meters(0.0, 0.0, 0.001, 0.0);
        assert!((distance - 111.195).abs() < 0.01, "got {distance}");
    }

    #[test]
    fn berlin_to_paris_distance() {
        let distance = haversine_distance_meters(52.52, 13.405, 48.8566, 2.3522);
        assert!((distance - 877_459.0).abs() < 500.0, "got {distance}");
    }

    #[test]
    fn zero_distance_for_identical_points() {
        let distance = haversine_distance_meters(40.7128, -74.0060, 40.7128, -74.0060);
        assert_eq!(distance, 0.0);
        assert!(within_radius(40.7128, -74.0060, 40.7128, -74.0060, 0.0));
    }

    #[test]
    fn fifty_meter_fence_boundary() {
        // 0.00044 deg of latitude = 48.93m, 0.00045 deg = 50.04m.
        assert!(within_radius(0.0, 0.0, 0.00044, 0.0, 50.0));
        assert!(!within_radius(0.0, 0.0, 0.00045, 0.0, 50.0));
    }

    #[test]
    fn boundary_is_inclusive() {
        let distance = haversine_distance_meters(40.0, -74.0, 40.0004, -74.0);
        assert!(distance > 0.0);
        assert!(within_radius(40.0, -74.0, 40.0004, -74.0, distance));
        assert!(!within_radius(40.0, -74.0, 40.0004, -74.0, distance - 0.001));
    }

    #[test]
    fn invalid_inputs_fail_closed() {
        assert!(haversine_distance_meters(f64::NAN, 0.0, 0.0, 0.0).is_nan());
        assert!(haversine_distance_meters(91.0, 0.0, 0.0, 0.0).is_nan());
        assert!(haversine_distance_meters(0.0, 181.0, 0.0, 0.0).is_nan());
        assert!(!within_radius(f64::NAN, 0.0, 0.0, 0.0, 50.0));
        assert!(!within_radius(91.0, 0.0, 0.0, 0.0, 50.0));
        assert!(!within_radius(0.0, 0.0, 0.0, 0.0, f64::NAN));
        assert!(!within_radius(0.0, 0.0, 0.0, 0.0, -1.0));
    }

    #[test]
    fn coordinate_validation_edges() {
        assert!(valid_coordinates(90.0, 180.0));
        assert!(valid_coordinates(-90.0, -180.0));
        assert!(!valid_coordinates(90.0001, 0.0));
        assert!(!valid_coordinates(0.0, -180.0001));
        assert!(!valid_coordinates(f64::INFINITY, 0.0));
    }
}
