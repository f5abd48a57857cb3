//! POST /predict: ranked per-spot P(free) predictions around a point.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::ProTierPrivacy;
use crate::db::queries;
use crate::engine::Engine;
use crate::errors::{AppError, ErrorResponse};
use crate::geo::{haversine, meters_to_degrees};
use crate::helpers::{round1, round3, round5};
use crate::model::confidence::ConfidenceDetail;
use crate::model::ensemble::{predict_spot, SpotScore};
use crate::model::time_decay::TimeDecayInfo;
use crate::serving::cache::make_key;

/// Maximum number of garages attached to a response.
const MAX_GARAGES: usize = 10;

fn default_radius() -> f64 {
    500.0
}

fn default_limit() -> usize {
    50
}

fn default_tier() -> String {
    "free".to_string()
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct PredictRequest {
    /// Latitude of the caller
    pub lat: f64,
    /// Longitude of the caller
    pub lng: f64,
    /// Search radius in metres (50–2000)
    #[serde(default = "default_radius")]
    pub radius_m: f64,
    /// Prediction time in ISO 8601 (defaults to now)
    #[serde(default)]
    pub time: Option<String>,
    /// Maximum number of predictions (1–200)
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// User tier: "free" or "pro"
    #[serde(default = "default_tier")]
    pub tier: String,
}

/// One spot's prediction.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SpotPrediction {
    pub spot_id: i64,
    pub street: String,
    /// Latitude, coarsened by privacy gating
    pub lat: f64,
    /// Longitude, coarsened by privacy gating
    pub lng: f64,
    /// Probability the spot is currently free (3 dp)
    pub p_free: f64,
    /// "guaranteed", "probable", "possible", or "unlikely"
    pub guarantee_level: String,
    pub confidence: ConfidenceDetail,
    pub time_decay: TimeDecayInfo,
    /// Expected sessions/hour (2 dp)
    pub turnover_rate: f64,
    pub zone_type: String,
    /// Human-readable restrictions, e.g. "Permit zone"
    pub restrictions: Vec<String>,
    pub distance_m: f64,
    pub neighborhood: String,
}

/// A nearby off-street option.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GarageInfo {
    pub garage_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub total_spaces: Option<i64>,
    pub available_spaces: Option<i64>,
    pub hourly_rate: Option<f64>,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PredictMeta {
    pub model_version: String,
    /// Wall-clock time spent computing the response (ms)
    pub prediction_time_ms: f64,
    pub total_spots_searched: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PredictResponse {
    pub predictions: Vec<SpotPrediction>,
    pub nearby_garages: Vec<GarageInfo>,
    pub meta: PredictMeta,
}

// ---------------------------------------------------------------------------
// Validation and privacy gating
// ---------------------------------------------------------------------------

fn validate(req: &PredictRequest) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&req.lat) {
        return Err(AppError::Validation("lat must be in [-90, 90]".to_string()));
    }
    if !(-180.0..=180.0).contains(&req.lng) {
        return Err(AppError::Validation("lng must be in [-180, 180]".to_string()));
    }
    if !(50.0..=2000.0).contains(&req.radius_m) {
        return Err(AppError::Validation(
            "radius_m must be in [50, 2000]".to_string(),
        ));
    }
    if !(1..=200).contains(&req.limit) {
        return Err(AppError::Validation("limit must be in [1, 200]".to_string()));
    }
    if req.tier != "free" && req.tier != "pro" {
        return Err(AppError::Validation(
            "tier must be 'free' or 'pro'".to_string(),
        ));
    }
    Ok(())
}

/// Parse an ISO 8601 time string. Offsets are accepted and dropped; the
/// pipeline operates in the city's wall-clock time.
pub fn parse_time(raw: &str) -> Result<NaiveDateTime, AppError> {
    if let Ok(dt) = raw.parse::<DateTime<FixedOffset>>() {
        return Ok(dt.naive_local());
    }
    raw.parse::<NaiveDateTime>()
        .map_err(|_| AppError::Validation("Invalid time format. Use ISO 8601.".to_string()))
}

/// Distance- and tier-based coordinate coarsening.
///
/// Pro tier: exact within 200m, ±50m uniform jitter to 400m, 3-decimal
/// rounding beyond. Free tier: 3-decimal rounding (~111m) everywhere.
pub fn apply_privacy_gating(
    lat: f64,
    lng: f64,
    distance_m: f64,
    tier: &str,
    cfg: &ProTierPrivacy,
) -> (f64, f64) {
    if tier == "pro" {
        if distance_m <= cfg.exact_within_m {
            return (lat, lng);
        }
        if distance_m <= cfg.fuzzy_within_m {
            let (lat_deg, lng_deg) = meters_to_degrees(cfg.fuzz_meters, lat);
            let offset_lat = (rand::random::<f64>() - 0.5) * 2.0 * lat_deg;
            let offset_lng = (rand::random::<f64>() - 0.5) * 2.0 * lng_deg;
            return (round5(lat + offset_lat), round5(lng + offset_lng));
        }
    }
    (round3(lat), round3(lng))
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Predict P(free) for curb spots near a point.
///
/// Scores every catalogue spot within the radius through the model
/// ensemble, applies privacy gating by tier and distance, and attaches
/// nearby garages. Responses are cached per location/time-bucket.
#[utoipa::path(
    post,
    path = "/predict",
    tag = "Predictions",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Ranked predictions for nearby spots", body = PredictResponse),
        (status = 400, description = "Invalid request parameters", body = ErrorResponse),
    )
)]
pub async fn predict(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    let start = Instant::now();
    validate(&req)?;

    let timestamp = match req.time.as_deref() {
        Some(raw) => parse_time(raw)?,
        None => Local::now().naive_local(),
    };

    let cache_key = make_key(req.lat, req.lng, timestamp, req.radius_m);
    if let Some(cached) = engine.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let nearby = engine
        .spot_index
        .query_nearby(req.lat, req.lng, req.radius_m, req.limit);
    let total_searched = nearby.len();

    let ctx = engine.feature_context();
    let mut predictions: Vec<SpotPrediction> = Vec::with_capacity(nearby.len());
    for candidate in &nearby {
        // A single spot failing to score drops that spot, not the request
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
        predictions.push(to_prediction(
            score,
            candidate.distance_m,
            &req.tier,
            &engine.config.privacy.pro_tier,
        ));
    }

    // Best spots first
    predictions.sort_by(|a, b| b.p_free.total_cmp(&a.p_free));

    let nearby_garages = fetch_nearby_garages(&engine, req.lat, req.lng, req.radius_m).await?;

    let response = PredictResponse {
        predictions,
        nearby_garages,
        meta: PredictMeta {
            model_version: engine.models.version().to_string(),
            prediction_time_ms: round1(start.elapsed().as_secs_f64() * 1000.0),
            total_spots_searched: total_searched,
            timestamp: timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
        },
    };

    engine.cache.put(cache_key, response.clone());
    Ok(Json(response))
}

fn to_prediction(
    score: SpotScore,
    distance_m: f64,
    tier: &str,
    privacy: &ProTierPrivacy,
) -> SpotPrediction {
    let (lat, lng) = apply_privacy_gating(score.lat, score.lng, distance_m, tier, privacy);
    SpotPrediction {
        spot_id: score.spot_id,
        street: score.street,
        lat,
        lng,
        p_free: score.p_free,
        guarantee_level: score.guarantee_level.to_string(),
        confidence: score.confidence,
        time_decay: score.time_decay,
        turnover_rate: score.turnover_rate,
        zone_type: score.zone_type,
        restrictions: score.restrictions,
        distance_m,
        neighborhood: score.neighborhood,
    }
}

/// Garages within twice the search radius, closest first, capped at 10.
pub async fn fetch_nearby_garages(
    engine: &Engine,
    lat: f64,
    lng: f64,
    radius_m: f64,
) -> Result<Vec<GarageInfo>, AppError> {
    let rows = queries::garages_with_latest_availability(&engine.pool).await?;

    let mut garages: Vec<GarageInfo> = rows
        .into_iter()
        .filter_map(|g| {
            let dist = haversine(lat, lng, g.lat, g.lng);
            (dist <= radius_m * 2.0).then(|| GarageInfo {
                garage_id: g.garage_id,
                name: g.name.unwrap_or_default(),
                lat: g.lat,
                lng: g.lng,
                total_spaces: g.total_spaces,
                available_spaces: g.available_spaces,
                hourly_rate: g.hourly_rate,
                distance_m: round1(dist),
            })
        })
        .collect();

    garages.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    garages.truncate(MAX_GARAGES);
    Ok(garages)
}
