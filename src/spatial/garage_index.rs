//! Flat list of garage coordinates. Garage counts are small (tens), so a
//! linear scan with exact haversine is sufficient.

use sqlx::SqlitePool;

use crate::db::models::GaragePoint;
use crate::db::queries;
use crate::geo::haversine;

pub struct GarageIndex {
    garages: Vec<GaragePoint>,
    loaded: bool,
}

impl GarageIndex {
    pub fn new() -> Self {
        Self {
            garages: Vec::new(),
            loaded: false,
        }
    }

    /// Load all garage coordinates. Idempotent.
    pub async fn load(&mut self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        if self.loaded {
            return Ok(());
        }
        self.garages = queries::load_garage_points(pool).await?;
        self.loaded = true;
        tracing::info!("GarageIndex loaded {} garages", self.garages.len());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Distance in metres to the nearest garage, or NaN if none are known.
    pub fn nearest_distance(&self, lat: f64, lng: f64) -> f64 {
        self.garages
            .iter()
            .map(|g| haversine(lat, lng, g.lat, g.lng))
            .fold(f64::NAN, f64::min)
    }

    #[cfg(test)]
    pub(crate) fn load_from_rows(&mut self, garages: Vec<GaragePoint>) {
        self.garages = garages;
        self.loaded = true;
    }
}

impl Default for GarageIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index_returns_nan() {
        let idx = GarageIndex::new();
        assert!(idx.nearest_distance(37.79, -122.40).is_nan());
    }

    #[test]
    fn test_nearest_distance() {
        let mut idx = GarageIndex::new();
        idx.load_from_rows(vec![
            GaragePoint {
                garage_id: "far".to_string(),
                lat: 37.8046,
                lng: -122.3999,
            },
            GaragePoint {
                garage_id: "near".to_string(),
                lat: 37.7948,
                lng: -122.3999,
            },
        ]);
        let d = idx.nearest_distance(37.7946, -122.3999);
        assert!(d > 15.0 && d < 30.0, "unexpected distance {}", d);
    }
}
