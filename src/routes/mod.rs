//! HTTP route handlers.
//!
//! - POST /predict: per-spot P(free) predictions within a radius
//! - GET  /blocks: block-level aggregates (safe for all tiers)
//! - POST /report: crowd report ingestion
//! - GET  /health: service health

pub mod blocks;
pub mod health;
pub mod predict;
pub mod report;
