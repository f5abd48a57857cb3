//! GET /health: service health.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db;
use crate::engine::Engine;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when models are loaded and the database answers; "degraded"
    /// otherwise (predictions still serve via fallbacks)
    pub status: String,
    pub model_loaded: bool,
    pub db_connected: bool,
    pub spots_indexed: usize,
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse),
    )
)]
pub async fn health(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    let db_connected = db::ping(&engine.pool).await;
    let model_loaded = engine.models.is_loaded();

    let status = if model_loaded && db_connected {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        model_loaded,
        db_connected,
        spots_indexed: if engine.spot_index.is_loaded() {
            engine.spot_index.count()
        } else {
            0
        },
    })
}
