//! POST /report: crowd report ingestion.
//!
//! Reports are append-only; each insert invalidates the prediction cache
//! around the reported location so the next request recomputes.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::NewCrowdReport;
use crate::db::queries;
use crate::engine::Engine;
use crate::errors::{AppError, ErrorResponse};

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportRequest {
    /// Opaque reporter identifier
    #[serde(default)]
    pub user_id: Option<String>,
    /// Catalogue spot the report refers to, if known
    #[serde(default)]
    pub spot_id: Option<i64>,
    pub lat: f64,
    pub lng: f64,
    /// "spot_free" or "spot_taken"
    pub report_type: String,
    /// Reporter confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportResponse {
    pub report_id: i64,
    pub message: String,
}

/// Submit a crowd report for a spot.
#[utoipa::path(
    post,
    path = "/report",
    tag = "Reports",
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Report accepted", body = ReportResponse),
        (status = 400, description = "Invalid report", body = ErrorResponse),
    )
)]
pub async fn submit_report(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ReportRequest>,
) -> Result<Json<ReportResponse>, AppError> {
    if req.report_type != "spot_free" && req.report_type != "spot_taken" {
        return Err(AppError::Validation(
            "report_type must be 'spot_free' or 'spot_taken'".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&req.lat) || !(-180.0..=180.0).contains(&req.lng) {
        return Err(AppError::Validation(
            "lat/lng out of geographic range".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&req.confidence) {
        return Err(AppError::Validation(
            "confidence must be in [0, 1]".to_string(),
        ));
    }

    let report_id = queries::insert_crowd_report(
        &engine.pool,
        &NewCrowdReport {
            user_id: req.user_id,
            spot_id: req.spot_id,
            lat: req.lat,
            lng: req.lng,
            report_type: req.report_type,
            reported_at: Utc::now(),
            confidence: req.confidence,
        },
    )
    .await?;

    engine.cache.invalidate_area(req.lat, req.lng, 500.0);

    Ok(Json(ReportResponse {
        report_id,
        message: "Report received".to_string(),
    }))
}
