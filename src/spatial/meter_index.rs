//! Flat in-memory store of parking meter posts.
//!
//! Meter queries rank thousands of candidates per request, so distances use
//! the equirectangular approximation rather than full haversine; at city
//! scale the ordering is identical.

use sqlx::SqlitePool;

use crate::db::models::Meter;
use crate::db::queries;
use crate::geo::equirectangular;

/// A meter post with its distance from the query point.
#[derive(Debug, Clone)]
pub struct NearestMeter {
    pub post_id: String,
    pub distance_m: f64,
}

/// Flat array of meter posts supporting k-NN and radius counts.
pub struct MeterIndex {
    meters: Vec<Meter>,
    loaded: bool,
}

impl MeterIndex {
    pub fn new() -> Self {
        Self {
            meters: Vec::new(),
            loaded: false,
        }
    }

    /// Load all meter posts. Idempotent.
    pub async fn load(&mut self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        if self.loaded {
            return Ok(());
        }
        self.meters = queries::load_meters(pool).await?;
        self.loaded = true;
        tracing::info!("MeterIndex loaded {} meters", self.meters.len());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn count(&self) -> usize {
        self.meters.len()
    }

    /// The k nearest meters, closest first. Ties are broken by input order.
    pub fn nearest(&self, lat: f64, lng: f64, k: usize) -> Vec<NearestMeter> {
        if self.meters.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(f64, usize)> = self
            .meters
            .iter()
            .enumerate()
            .map(|(i, m)| (equirectangular(lat, lng, m.lat, m.lng), i))
            .collect();

        let k = k.min(ranked.len());
        if k < ranked.len() {
            ranked.select_nth_unstable_by(k - 1, |a, b| {
                a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
            });
            ranked.truncate(k);
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        ranked
            .into_iter()
            .map(|(dist, i)| NearestMeter {
                post_id: self.meters[i].post_id.clone(),
                distance_m: dist,
            })
            .collect()
    }

    /// Count of meters within `radius_m` of a point.
    pub fn count_within(&self, lat: f64, lng: f64, radius_m: f64) -> usize {
        self.meters
            .iter()
            .filter(|m| equirectangular(lat, lng, m.lat, m.lng) <= radius_m)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn load_from_rows(&mut self, meters: Vec<Meter>) {
        self.meters = meters;
        self.loaded = true;
    }
}

impl Default for MeterIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter(post_id: &str, lat: f64, lng: f64) -> Meter {
        Meter {
            post_id: post_id.to_string(),
            lat,
            lng,
        }
    }

    fn index_with(meters: Vec<Meter>) -> MeterIndex {
        let mut idx = MeterIndex::new();
        idx.load_from_rows(meters);
        idx
    }

    #[test]
    fn test_nearest_empty_index() {
        let idx = MeterIndex::new();
        assert!(idx.nearest(37.79, -122.40, 3).is_empty());
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let idx = index_with(vec![
            meter("far", 37.7990, -122.3999),
            meter("near", 37.7948, -122.3999),
            meter("mid", 37.7960, -122.3999),
        ]);
        let nearest = idx.nearest(37.7946, -122.3999, 3);
        let ids: Vec<&str> = nearest.iter().map(|m| m.post_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_nearest_k_larger_than_store() {
        let idx = index_with(vec![meter("only", 37.7948, -122.3999)]);
        let nearest = idx.nearest(37.7946, -122.3999, 5);
        assert_eq!(nearest.len(), 1);
    }

    #[test]
    fn test_nearest_ties_keep_input_order() {
        let idx = index_with(vec![
            meter("first", 37.7950, -122.3999),
            meter("second", 37.7950, -122.3999),
        ]);
        let nearest = idx.nearest(37.7946, -122.3999, 2);
        assert_eq!(nearest[0].post_id, "first");
        assert_eq!(nearest[1].post_id, "second");
    }

    #[test]
    fn test_count_within() {
        let idx = index_with(vec![
            meter("a", 37.7948, -122.3999), // ~22m
            meter("b", 37.7955, -122.3999), // ~100m
            meter("c", 37.7990, -122.3999), // ~490m
        ]);
        assert_eq!(idx.count_within(37.7946, -122.3999, 150.0), 2);
        assert_eq!(idx.count_within(37.7946, -122.3999, 1000.0), 3);
        assert_eq!(idx.count_within(37.7946, -122.3999, 5.0), 0);
    }
}
