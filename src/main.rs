// Curbcast prediction API v0.1
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod engine;
mod errors;
mod features;
mod geo;
mod helpers;
mod model;
mod routes;
mod serving;
mod services;
mod spatial;

use config::AppConfig;
use engine::Engine;
use services::poller::Pollers;

/// Default listen port when PORT is unset.
const DEFAULT_PORT: u16 = 8000;

/// Curbcast API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Curbcast Prediction API",
        version = "0.1.0",
        description = "Curbside parking availability predictions for San Francisco. \
            Scores catalogue curb spots through a chained model ensemble \
            (occupancy, calibration, transfer, turnover, time decay, confidence), \
            blends in cached real-time signals, and serves ranked per-spot \
            P(free) estimates with privacy gating by user tier.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Predictions", description = "Per-spot and per-block predictions"),
        (name = "Reports", description = "Crowd report ingestion"),
        (name = "Health", description = "Service health check"),
    ),
    paths(
        routes::predict::predict,
        routes::blocks::blocks,
        routes::report::submit_report,
        routes::health::health,
    ),
    components(
        schemas(
            routes::predict::PredictRequest,
            routes::predict::PredictResponse,
            routes::predict::SpotPrediction,
            routes::predict::GarageInfo,
            routes::predict::PredictMeta,
            routes::blocks::BlockResponse,
            routes::blocks::BlockSummary,
            routes::report::ReportRequest,
            routes::report::ReportResponse,
            routes::health::HealthResponse,
            model::confidence::ConfidenceDetail,
            model::confidence::ConfidenceSources,
            model::time_decay::TimeDecayInfo,
            model::time_decay::FutureConfidence,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "curbcast_api={},tower_http=info",
            config.logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    // Environment first: credentials referenced by ${VAR} in the config
    config::load_env_file();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = AppConfig::load(Path::new(&config_path)).expect("Failed to load configuration");

    init_tracing(&config);
    tracing::info!("Starting Curbcast prediction engine...");

    // Storage: open the pool and create tables (idempotent)
    let pool = db::connect(&config.database.path)
        .await
        .expect("Failed to open database");
    db::init_schema(&pool)
        .await
        .expect("Failed to initialize database schema");

    // Spatial stores and model artifacts load inside the engine build;
    // model absence degrades to fallbacks rather than aborting
    let engine = Arc::new(
        Engine::build(config, pool)
            .await
            .expect("Failed to build engine"),
    );

    // Pollers start only after indexes and models are ready
    let pollers = Pollers::start(engine.clone());

    // CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/predict", post(routes::predict::predict))
        .route("/blocks", get(routes::blocks::blocks))
        .route("/report", post(routes::report::submit_report))
        .route("/health", get(routes::health::health))
        .with_state(engine);

    let app = Router::new()
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prediction engine listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server terminated unexpectedly");

    // Traffic has stopped; wind down the pollers before the pool drops
    pollers.shutdown().await;
    tracing::info!("Shutting down prediction engine.");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
}
