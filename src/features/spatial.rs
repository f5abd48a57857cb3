//! Spatial features: coordinates, neighborhood assignment, and meter/garage
//! density around a spot.

use crate::config::AppConfig;
use crate::db::models::Spot;
use crate::features::{FeatureContext, FeatureMap};
use crate::geo::haversine;

/// Neighborhood display name → integer id, shared with the training matrix.
const NEIGHBORHOOD_IDS: [(&str, i32); 10] = [
    ("Financial District", 0),
    ("SoMa", 1),
    ("Mission", 2),
    ("Fisherman's Wharf / North Beach", 3),
    ("Marina", 4),
    ("Civic Center / Hayes Valley", 5),
    ("Union Square", 6),
    ("Chinatown", 7),
    ("Castro", 8),
    ("Haight-Ashbury", 9),
];

/// Display name → canonical lowercase_underscore configuration key.
const NAME_TO_KEY: [(&str, &str); 10] = [
    ("Financial District", "financial_district"),
    ("SoMa", "soma"),
    ("Mission", "mission"),
    ("Fisherman's Wharf / North Beach", "north_beach"),
    ("Marina", "marina"),
    ("Civic Center / Hayes Valley", "civic_center"),
    ("Union Square", "union_square"),
    ("Chinatown", "chinatown"),
    ("Castro", "castro"),
    ("Haight-Ashbury", "haight"),
];

pub fn neighborhood_id(name: &str) -> i32 {
    NEIGHBORHOOD_IDS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
        .unwrap_or(-1)
}

/// Canonical key for a display name. Unknown names are lowercased with
/// spaces replaced, matching the signal writers' convention.
pub fn name_to_key(name: &str) -> String {
    NAME_TO_KEY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, k)| k.to_string())
        .unwrap_or_else(|| name.to_lowercase().replace(' ', "_"))
}

/// Assign a point to the closest configured neighborhood whose declared
/// radius contains it. Returns (display_name, id).
pub fn classify_neighborhood(config: &AppConfig, lat: f64, lng: f64) -> (Option<String>, i32) {
    let mut best_name: Option<&str> = None;
    let mut best_dist = f64::INFINITY;
    for nbhd in config.neighborhoods.values() {
        let dist = haversine(lat, lng, nbhd.lat, nbhd.lng);
        if dist < nbhd.radius_m && dist < best_dist {
            best_dist = dist;
            best_name = Some(&nbhd.name);
        }
    }
    let id = best_name.map(neighborhood_id).unwrap_or(-1);
    (best_name.map(|s| s.to_string()), id)
}

/// The neighborhood key used to join a spot to signals and zone defaults.
pub fn neighborhood_key_for_spot(config: &AppConfig, spot: &Spot) -> Option<String> {
    if let Some(name) = spot.neighborhood.as_deref() {
        if !name.is_empty() {
            return Some(name_to_key(name));
        }
    }
    let (name, _) = classify_neighborhood(config, spot.lat, spot.lng);
    name.map(|n| name_to_key(&n))
}

/// Compute the 8 spatial features for a spot. Time-invariant.
pub fn compute(ctx: &FeatureContext<'_>, spot: &Spot) -> FeatureMap {
    let lat = spot.lat;
    let lng = spot.lng;

    let nearest = ctx.meters.nearest(lat, lng, 1);
    let dist_nearest = nearest.first().map(|m| m.distance_m).unwrap_or(f64::NAN);
    let meters_100 = ctx.meters.count_within(lat, lng, 100.0);
    let meters_200 = ctx.meters.count_within(lat, lng, 200.0);

    let nbhd_id = match spot.neighborhood.as_deref() {
        Some(name) if !name.is_empty() => neighborhood_id(name),
        _ => classify_neighborhood(ctx.config, lat, lng).1,
    };

    let dist_garage = ctx.garages.nearest_distance(lat, lng);

    // A block is roughly four 100m segments
    let block_density = if meters_200 > 0 {
        meters_200 as f64 / 4.0
    } else {
        0.0
    };

    let mut f = FeatureMap::new();
    f.insert("lat", lat);
    f.insert("lng", lng);
    f.insert("neighborhood_id", nbhd_id as f64);
    f.insert("dist_to_nearest_meter", dist_nearest);
    f.insert("meters_within_100m", meters_100 as f64);
    f.insert("meters_within_200m", meters_200 as f64);
    f.insert("block_density", block_density);
    f.insert("dist_to_nearest_garage", dist_garage);
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Meter;
    use crate::spatial::{GarageIndex, MeterIndex};
    use sqlx::sqlite::SqlitePoolOptions;

    fn test_config() -> AppConfig {
        AppConfig::load(std::path::Path::new("config.yaml")).expect("config")
    }

    async fn any_pool() -> sqlx::SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn spot_at(lat: f64, lng: f64, neighborhood: Option<&str>) -> Spot {
        Spot {
            spot_id: 1,
            lat,
            lng,
            street_name: None,
            neighborhood: neighborhood.map(|s| s.to_string()),
            time_limit: None,
            permit_zone: None,
            curb_color: None,
            sweeping_schedule: None,
            confidence_score: None,
            data_sources: None,
        }
    }

    #[test]
    fn test_neighborhood_id_table() {
        assert_eq!(neighborhood_id("Financial District"), 0);
        assert_eq!(neighborhood_id("Marina"), 4);
        assert_eq!(neighborhood_id("Atlantis"), -1);
    }

    #[test]
    fn test_name_to_key() {
        assert_eq!(name_to_key("Fisherman's Wharf / North Beach"), "north_beach");
        assert_eq!(name_to_key("Outer Sunset"), "outer_sunset");
    }

    #[test]
    fn test_classify_neighborhood_inside_radius() {
        let cfg = test_config();
        let (name, id) = classify_neighborhood(&cfg, 37.7946, -122.3999);
        assert_eq!(name.as_deref(), Some("Financial District"));
        assert_eq!(id, 0);
    }

    #[test]
    fn test_classify_neighborhood_outside_all_regions() {
        let cfg = test_config();
        let (name, id) = classify_neighborhood(&cfg, 0.0, 0.0);
        assert_eq!(name, None);
        assert_eq!(id, -1);
    }

    #[test]
    fn test_neighborhood_key_prefers_spot_name() {
        let cfg = test_config();
        // Coordinates are in the Financial District but the catalogue says Marina
        let spot = spot_at(37.7946, -122.3999, Some("Marina"));
        assert_eq!(neighborhood_key_for_spot(&cfg, &spot).as_deref(), Some("marina"));
    }

    #[tokio::test]
    async fn test_compute_features() {
        let cfg = test_config();
        let pool = any_pool().await;
        let mut meters = MeterIndex::new();
        meters.load_from_rows(vec![
            Meter {
                post_id: "m1".to_string(),
                lat: 37.7948,
                lng: -122.3999,
            },
            Meter {
                post_id: "m2".to_string(),
                lat: 37.7960,
                lng: -122.3999,
            },
        ]);
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let f = compute(&ctx, &spot_at(37.7946, -122.3999, None));
        assert_eq!(f["neighborhood_id"], 0.0);
        assert!(f["dist_to_nearest_meter"] < 30.0);
        assert_eq!(f["meters_within_100m"], 1.0);
        assert_eq!(f["meters_within_200m"], 2.0);
        assert_eq!(f["block_density"], 0.5);
        assert!(f["dist_to_nearest_garage"].is_nan());
    }
}
