//! Geographic distance primitives shared by the spatial stores and feature
//! extractors.
//!
//! Two distance functions exist because the stores have different accuracy
//! requirements:
//!
//! - `haversine`: exact great-circle distance, used wherever a result is
//!   user-visible (spot distances, garage distances, sign radii).
//! - `equirectangular`: flat-earth approximation, used by the meter index
//!   where thousands of candidates are ranked and the error at city scale
//!   (< 0.1%) does not change the ordering.

/// Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Metres per degree of latitude (WGS84 mean).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance in metres between two lat/lng points.
pub fn haversine(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlam = (lng2 - lng1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlam / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Equirectangular-projection distance in metres.
///
/// `d = R · √(Δφ² + (Δλ·cos φ)²)` with φ taken at the query point.
pub fn equirectangular(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi = lat1.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlam = (lng2 - lng1).to_radians() * phi.cos();
    EARTH_RADIUS_M * (dphi * dphi + dlam * dlam).sqrt()
}

/// Approximate conversion from metres to (lat_degrees, lng_degrees) at a
/// given latitude. Used to build bounding boxes for range queries.
pub fn meters_to_degrees(meters: f64, lat: f64) -> (f64, f64) {
    let lat_deg = meters / METERS_PER_DEGREE;
    let lng_deg = meters / (METERS_PER_DEGREE * lat.to_radians().cos());
    (lat_deg, lng_deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_zero_at_same_point() {
        assert_eq!(haversine(37.7946, -122.3999, 37.7946, -122.3999), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let d1 = haversine(37.7946, -122.3999, 37.8015, -122.4368);
        let d2 = haversine(37.8015, -122.4368, 37.7946, -122.3999);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_non_negative() {
        let d = haversine(37.0, -122.0, 38.0, -123.0);
        assert!(d > 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Financial District → Marina is roughly 3.3 km
        let d = haversine(37.7946, -122.3999, 37.8015, -122.4368);
        assert!(d > 3_000.0 && d < 3_600.0, "unexpected distance {}", d);
    }

    #[test]
    fn test_equirectangular_close_to_haversine_at_city_scale() {
        let h = haversine(37.7946, -122.3999, 37.7960, -122.4020);
        let e = equirectangular(37.7946, -122.3999, 37.7960, -122.4020);
        assert!((h - e).abs() / h < 0.005, "h={} e={}", h, e);
    }

    #[test]
    fn test_meters_to_degrees() {
        let (lat_deg, lng_deg) = meters_to_degrees(111_320.0, 0.0);
        assert!((lat_deg - 1.0).abs() < 1e-9);
        assert!((lng_deg - 1.0).abs() < 1e-9);

        // Longitude degrees stretch with latitude
        let (_, lng_deg_sf) = meters_to_degrees(111_320.0, 37.8);
        assert!(lng_deg_sf > 1.2);
    }
}
