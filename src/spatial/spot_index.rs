//! R-tree index over the curb-spot catalogue.
//!
//! Bulk-loaded once at startup; `query_nearby` answers radius queries by
//! intersecting a bounding box in the tree and filtering candidates by exact
//! haversine distance.

use std::collections::HashMap;

use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use sqlx::SqlitePool;

use crate::db::models::Spot;
use crate::db::queries;
use crate::geo::{haversine, meters_to_degrees};
use crate::helpers::round1;

/// Tree entries are points in (lng, lat) order carrying the spot id.
type SpotPoint = GeomWithData<[f64; 2], i64>;

/// A catalogue spot with its distance from the query point attached.
#[derive(Debug, Clone)]
pub struct SpotWithDistance {
    pub spot: Spot,
    pub distance_m: f64,
}

/// R-tree index over curb spots for radius queries.
pub struct SpotIndex {
    tree: RTree<SpotPoint>,
    spots: HashMap<i64, Spot>,
    loaded: bool,
}

impl SpotIndex {
    pub fn new() -> Self {
        Self {
            tree: RTree::new(),
            spots: HashMap::new(),
            loaded: false,
        }
    }

    /// Bulk-load every catalogue spot into the tree. Idempotent: a second
    /// call on a loaded index is a no-op.
    pub async fn load(&mut self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        if self.loaded {
            return Ok(());
        }

        let rows = queries::load_spots(pool).await?;
        let mut points = Vec::with_capacity(rows.len());
        let mut spots = HashMap::with_capacity(rows.len());
        for spot in rows {
            points.push(SpotPoint::new([spot.lng, spot.lat], spot.spot_id));
            spots.insert(spot.spot_id, spot);
        }

        self.tree = RTree::bulk_load(points);
        self.spots = spots;
        self.loaded = true;
        tracing::info!("SpotIndex loaded {} spots", self.spots.len());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn count(&self) -> usize {
        self.spots.len()
    }

    pub fn get(&self, spot_id: i64) -> Option<&Spot> {
        self.spots.get(&spot_id)
    }

    /// Spots within `radius_m` of (lat, lng), sorted by ascending distance
    /// and truncated to `limit`.
    pub fn query_nearby(
        &self,
        lat: f64,
        lng: f64,
        radius_m: f64,
        limit: usize,
    ) -> Vec<SpotWithDistance> {
        let (lat_off, lng_off) = meters_to_degrees(radius_m, lat);
        let envelope = AABB::from_corners([lng - lng_off, lat - lat_off], [
            lng + lng_off,
            lat + lat_off,
        ]);

        let mut results: Vec<SpotWithDistance> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|point| {
                let spot = self.spots.get(&point.data)?;
                let dist = haversine(lat, lng, spot.lat, spot.lng);
                (dist <= radius_m).then(|| SpotWithDistance {
                    spot: spot.clone(),
                    distance_m: round1(dist),
                })
            })
            .collect();

        results.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        results.truncate(limit);
        results
    }

    #[cfg(test)]
    pub(crate) fn load_from_rows(&mut self, rows: Vec<Spot>) {
        let mut points = Vec::with_capacity(rows.len());
        let mut spots = HashMap::with_capacity(rows.len());
        for spot in rows {
            points.push(SpotPoint::new([spot.lng, spot.lat], spot.spot_id));
            spots.insert(spot.spot_id, spot);
        }
        self.tree = RTree::bulk_load(points);
        self.spots = spots;
        self.loaded = true;
    }
}

impl Default for SpotIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(id: i64, lat: f64, lng: f64) -> Spot {
        Spot {
            spot_id: id,
            lat,
            lng,
            street_name: None,
            neighborhood: None,
            time_limit: None,
            permit_zone: None,
            curb_color: None,
            sweeping_schedule: None,
            confidence_score: None,
            data_sources: None,
        }
    }

    fn index_with(spots: Vec<Spot>) -> SpotIndex {
        let mut idx = SpotIndex::new();
        idx.load_from_rows(spots);
        idx
    }

    #[test]
    fn test_query_sorted_by_distance() {
        // ~111m per 0.001° of latitude
        let idx = index_with(vec![
            spot(1, 37.7966, -122.3999),
            spot(2, 37.7948, -122.3999),
            spot(3, 37.7956, -122.3999),
        ]);
        let results = idx.query_nearby(37.7946, -122.3999, 500.0, 50);
        let ids: Vec<i64> = results.iter().map(|r| r.spot.spot_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_query_respects_radius() {
        let idx = index_with(vec![
            spot(1, 37.7948, -122.3999), // ~22m
            spot(2, 37.8046, -122.3999), // ~1.1km
        ]);
        let results = idx.query_nearby(37.7946, -122.3999, 200.0, 50);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].spot.spot_id, 1);
    }

    #[test]
    fn test_query_respects_limit() {
        let spots = (0..20)
            .map(|i| spot(i, 37.7946 + i as f64 * 0.0001, -122.3999))
            .collect();
        let idx = index_with(spots);
        let results = idx.query_nearby(37.7946, -122.3999, 2000.0, 5);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_radius_below_nearest_spot_is_empty() {
        let idx = index_with(vec![spot(1, 37.7966, -122.3999)]);
        let results = idx.query_nearby(37.7946, -122.3999, 50.0, 50);
        assert!(results.is_empty());
    }

    #[test]
    fn test_distance_attached() {
        let idx = index_with(vec![spot(1, 37.7948, -122.3999)]);
        let results = idx.query_nearby(37.7946, -122.3999, 500.0, 50);
        assert!(results[0].distance_m > 15.0 && results[0].distance_m < 30.0);
    }

    #[test]
    fn test_get_by_id() {
        let idx = index_with(vec![spot(7, 37.79, -122.40)]);
        assert!(idx.get(7).is_some());
        assert!(idx.get(8).is_none());
    }
}
