//! GET /blocks: block-level aggregated predictions.
//!
//! Groups in-radius spots by (street, neighborhood) and reports per-block
//! totals only, so the endpoint is safe for every tier: no per-spot
//! coordinates ever leave the service.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::engine::Engine;
use crate::errors::{AppError, ErrorResponse};
use crate::helpers::{round1, round3};
use crate::model::ensemble::{predict_spot, SpotScore};
use crate::routes::predict::PredictMeta;

/// Spots scored per blocks request.
const BLOCK_SCAN_LIMIT: usize = 200;

fn default_radius() -> f64 {
    500.0
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BlocksQuery {
    /// Latitude of the caller
    pub lat: f64,
    /// Longitude of the caller
    pub lng: f64,
    /// Search radius in metres
    #[serde(default = "default_radius")]
    pub radius_m: f64,
}

/// Aggregate prediction for one street block.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockSummary {
    pub street: String,
    pub neighborhood: String,
    pub total_spots: usize,
    pub avg_p_free: f64,
    pub best_p_free: f64,
    pub zone_type: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockResponse {
    pub blocks: Vec<BlockSummary>,
    pub meta: PredictMeta,
}

/// Block-level aggregated predictions for an area.
#[utoipa::path(
    get,
    path = "/blocks",
    tag = "Predictions",
    params(BlocksQuery),
    responses(
        (status = 200, description = "Per-block prediction aggregates", body = BlockResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
    )
)]
pub async fn blocks(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<BlocksQuery>,
) -> Result<Json<BlockResponse>, AppError> {
    let start = Instant::now();

    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lng) {
        return Err(AppError::Validation(
            "lat/lng out of geographic range".to_string(),
        ));
    }

    let timestamp = Local::now().naive_local();
    let nearby = engine
        .spot_index
        .query_nearby(params.lat, params.lng, params.radius_m, BLOCK_SCAN_LIMIT);
    let total_searched = nearby.len();

    let ctx = engine.feature_context();
    let mut grouped: BTreeMap<(String, String), Vec<SpotScore>> = BTreeMap::new();
    for candidate in &nearby {
        let score = match predict_spot(
            &ctx,
            &engine.plugins,
            &engine.models,
            &engine.config,
            &candidate.spot,
            timestamp,
        )
        .await
        {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Scoring failed for spot {}: {}", candidate.spot.spot_id, e);
                continue;
            }
        };
        let street = if score.street.is_empty() {
            "Unknown".to_string()
        } else {
            score.street.clone()
        };
        grouped
            .entry((street, score.neighborhood.clone()))
            .or_default()
            .push(score);
    }

    let mut summaries: Vec<BlockSummary> = grouped
        .into_iter()
        .map(|((street, neighborhood), scores)| {
            let p_frees: Vec<f64> = scores.iter().map(|s| s.p_free).collect();
            let avg = p_frees.iter().sum::<f64>() / p_frees.len() as f64;
            let best = p_frees.iter().copied().fold(f64::MIN, f64::max);
            BlockSummary {
                street,
                neighborhood,
                total_spots: scores.len(),
                avg_p_free: round3(avg),
                best_p_free: round3(best),
                zone_type: scores[0].zone_type.clone(),
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.avg_p_free.total_cmp(&a.avg_p_free));

    Ok(Json(BlockResponse {
        blocks: summaries,
        meta: PredictMeta {
            model_version: engine.models.version().to_string(),
            prediction_time_ms: round1(start.elapsed().as_secs_f64() * 1000.0),
            total_spots_searched: total_searched,
            timestamp: timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::engine::test_support::engine_with;
    use sqlx::SqlitePool;

    async fn seed_spot(pool: &SqlitePool, id: i64, lat: f64, lng: f64, street: &str) {
        sqlx::query(
            "INSERT INTO curb_spots (spot_id, lat, lng, street_name, neighborhood)
             VALUES (?, ?, ?, ?, 'Financial District')",
        )
        .bind(id)
        .bind(lat)
        .bind(lng)
        .bind(street)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_blocks_grouping() {
        let pool = memory_pool().await;
        seed_spot(&pool, 1, 37.7946, -122.3999, "Battery St").await;
        seed_spot(&pool, 2, 37.7948, -122.3999, "Battery St").await;
        seed_spot(&pool, 3, 37.7950, -122.4001, "Sansome St").await;

        let engine = engine_with(pool).await;
        let resp = blocks(
            State(engine),
            Query(BlocksQuery {
                lat: 37.7946,
                lng: -122.3999,
                radius_m: 500.0,
            }),
        )
        .await
        .unwrap()
        .0;

        assert_eq!(resp.blocks.len(), 2);
        let battery = resp.blocks.iter().find(|b| b.street == "Battery St").unwrap();
        assert_eq!(battery.total_spots, 2);
        assert!(battery.best_p_free >= battery.avg_p_free);
        assert_eq!(resp.meta.total_spots_searched, 3);
    }

    #[tokio::test]
    async fn test_blocks_sorted_by_avg_descending() {
        let pool = memory_pool().await;
        seed_spot(&pool, 1, 37.7946, -122.3999, "Battery St").await;
        seed_spot(&pool, 2, 37.7948, -122.4001, "Sansome St").await;

        let engine = engine_with(pool).await;
        let resp = blocks(
            State(engine),
            Query(BlocksQuery {
                lat: 37.7946,
                lng: -122.3999,
                radius_m: 500.0,
            }),
        )
        .await
        .unwrap()
        .0;

        for pair in resp.blocks.windows(2) {
            assert!(pair[0].avg_p_free >= pair[1].avg_p_free);
        }
    }

    #[tokio::test]
    async fn test_blocks_rejects_bad_coordinates() {
        let pool = memory_pool().await;
        let engine = engine_with(pool).await;
        let result = blocks(
            State(engine),
            Query(BlocksQuery {
                lat: 95.0,
                lng: -122.3999,
                radius_m: 500.0,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
