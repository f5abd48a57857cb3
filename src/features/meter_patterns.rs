//! Meter pattern features from the pre-computed hourly occupancy table.
//!
//! These carry the ground-truth signal from 36 months of meter transactions
//! and dominate model importance.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::db::models::Spot;
use crate::db::queries;
use crate::features::{FeatureContext, FeatureMap};

/// Candidate pool for the block average: up to this many nearest meters,
/// kept while within 100m.
const BLOCK_CANDIDATES: usize = 10;

fn nan_features() -> FeatureMap {
    let mut f = FeatureMap::new();
    f.insert("nearest_meter_occupancy", f64::NAN);
    f.insert("nearest_3_meter_avg", f64::NAN);
    f.insert("block_avg_occupancy", f64::NAN);
    f.insert("turnover_rate", f64::NAN);
    f.insert("avg_session_duration", f64::NAN);
    f.insert("occupancy_trend", f64::NAN);
    f.insert("meter_sample_count", 0.0);
    f
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Compute the 7 meter-pattern features for a spot at a time.
pub async fn compute(
    ctx: &FeatureContext<'_>,
    spot: &Spot,
    ts: NaiveDateTime,
) -> Result<FeatureMap, sqlx::Error> {
    // The hourly table uses Sun=0..Sat=6; chrono weekdays are Mon=0..Sun=6
    let dow = (ts.weekday().num_days_from_monday() + 1) % 7;
    let hour = ts.hour();
    let month = ts.month();

    let nearest = ctx.meters.nearest(spot.lat, spot.lng, 3);
    if nearest.is_empty() {
        return Ok(nan_features());
    }

    let nearest_id = &nearest[0].post_id;
    let nearest_pattern = queries::hourly_pattern(ctx.pool, nearest_id, dow, hour, Some(month)).await?;

    let (nearest_occupancy, turnover, avg_duration, sample_count) = match &nearest_pattern {
        Some(p) => (
            p.occupancy_rate,
            p.turnover_rate.unwrap_or(f64::NAN),
            p.avg_duration.unwrap_or(f64::NAN),
            p.sample_count as f64,
        ),
        None => (f64::NAN, f64::NAN, f64::NAN, 0.0),
    };

    // Average over the 3 nearest meters with available lookups
    let mut occ_values = Vec::with_capacity(nearest.len());
    for m in &nearest {
        if let Some(p) = queries::hourly_pattern(ctx.pool, &m.post_id, dow, hour, Some(month)).await? {
            occ_values.push(p.occupancy_rate);
        }
    }
    let avg_3 = mean(&occ_values);

    // Block average: meters within 100m among the nearest candidates
    let block_meters = ctx.meters.nearest(spot.lat, spot.lng, BLOCK_CANDIDATES);
    let mut block_values = Vec::new();
    for m in &block_meters {
        if m.distance_m > 100.0 {
            break;
        }
        if let Some(p) = queries::hourly_pattern(ctx.pool, &m.post_id, dow, hour, Some(month)).await? {
            block_values.push(p.occupancy_rate);
        }
    }
    let block_avg = mean(&block_values);

    // Trend: current rate minus the prior hour's all-month rate
    let prior = queries::prior_hour_occupancy(ctx.pool, nearest_id, dow, hour).await?;
    let trend = match (prior, &nearest_pattern) {
        (Some(prior_rate), Some(p)) => p.occupancy_rate - prior_rate,
        _ => f64::NAN,
    };

    let mut f = FeatureMap::new();
    f.insert("nearest_meter_occupancy", nearest_occupancy);
    f.insert("nearest_3_meter_avg", avg_3);
    f.insert("block_avg_occupancy", block_avg);
    f.insert("turnover_rate", turnover);
    f.insert("avg_session_duration", avg_duration);
    f.insert("occupancy_trend", trend);
    f.insert("meter_sample_count", sample_count);
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::memory_pool;
    use crate::db::models::Meter;
    use crate::spatial::{GarageIndex, MeterIndex};
    use chrono::NaiveDate;
    use sqlx::SqlitePool;

    fn spot_at(lat: f64, lng: f64) -> Spot {
        Spot {
            spot_id: 1,
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

    async fn seed(pool: &SqlitePool, post: &str, dow: u32, hour: u32, month: Option<u32>, rate: f64) {
        sqlx::query(
            "INSERT INTO meter_occupancy_hourly
             (meter_post_id, day_of_week, hour, month, occupancy_rate, avg_duration,
              turnover_rate, sample_count)
             VALUES (?, ?, ?, ?, ?, 40.0, 2.5, 200)",
        )
        .bind(post)
        .bind(dow)
        .bind(hour)
        .bind(month)
        .bind(rate)
        .execute(pool)
        .await
        .unwrap();
    }

    // Monday 2024-06-03 09:00, stored dow is (0+1)%7 = 1
    fn monday_9am() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_meters_yields_nans() {
        let pool = memory_pool().await;
        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let meters = MeterIndex::new();
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let f = compute(&ctx, &spot_at(37.79, -122.40), monday_9am())
            .await
            .unwrap();
        assert!(f["nearest_meter_occupancy"].is_nan());
        assert_eq!(f["meter_sample_count"], 0.0);
    }

    #[tokio::test]
    async fn test_dow_conversion_and_lookup() {
        let pool = memory_pool().await;
        // Stored under Sun=0 convention: Monday = 1
        seed(&pool, "m1", 1, 9, None, 0.85).await;

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let mut meters = MeterIndex::new();
        meters.load_from_rows(vec![Meter {
            post_id: "m1".to_string(),
            lat: 37.7948,
            lng: -122.3999,
        }]);
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let f = compute(&ctx, &spot_at(37.7946, -122.3999), monday_9am())
            .await
            .unwrap();
        assert_eq!(f["nearest_meter_occupancy"], 0.85);
        assert_eq!(f["meter_sample_count"], 200.0);
        assert_eq!(f["turnover_rate"], 2.5);
    }

    #[tokio::test]
    async fn test_month_specific_preferred_over_aggregate() {
        let pool = memory_pool().await;
        seed(&pool, "m1", 1, 9, None, 0.5).await;
        seed(&pool, "m1", 1, 9, Some(6), 0.9).await;

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let mut meters = MeterIndex::new();
        meters.load_from_rows(vec![Meter {
            post_id: "m1".to_string(),
            lat: 37.7948,
            lng: -122.3999,
        }]);
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let f = compute(&ctx, &spot_at(37.7946, -122.3999), monday_9am())
            .await
            .unwrap();
        assert_eq!(f["nearest_meter_occupancy"], 0.9);
    }

    #[tokio::test]
    async fn test_occupancy_trend() {
        let pool = memory_pool().await;
        seed(&pool, "m1", 1, 9, None, 0.8).await;
        seed(&pool, "m1", 1, 8, None, 0.6).await;

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let mut meters = MeterIndex::new();
        meters.load_from_rows(vec![Meter {
            post_id: "m1".to_string(),
            lat: 37.7948,
            lng: -122.3999,
        }]);
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let f = compute(&ctx, &spot_at(37.7946, -122.3999), monday_9am())
            .await
            .unwrap();
        assert!((f["occupancy_trend"] - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_three_meter_average() {
        let pool = memory_pool().await;
        seed(&pool, "m1", 1, 9, None, 0.8).await;
        seed(&pool, "m2", 1, 9, None, 0.6).await;
        // m3 has no pattern row; the average covers available lookups only

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let mut meters = MeterIndex::new();
        meters.load_from_rows(vec![
            Meter {
                post_id: "m1".to_string(),
                lat: 37.7948,
                lng: -122.3999,
            },
            Meter {
                post_id: "m2".to_string(),
                lat: 37.7950,
                lng: -122.3999,
            },
            Meter {
                post_id: "m3".to_string(),
                lat: 37.7952,
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

        let f = compute(&ctx, &spot_at(37.7946, -122.3999), monday_9am())
            .await
            .unwrap();
        assert!((f["nearest_3_meter_avg"] - 0.7).abs() < 1e-9);
        assert!((f["block_avg_occupancy"] - 0.7).abs() < 1e-9);
    }
}
