use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A curb spot from the static catalogue. Immutable for the process
/// lifetime; catalogue coordinates are treated as ground truth.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Spot {
    pub spot_id: i64,
    pub lat: f64,
    pub lng: f64,
    pub street_name: Option<String>,
    pub neighborhood: Option<String>,
    /// Pre-parsed regulatory text, e.g. "2 hours".
    pub time_limit: Option<String>,
    pub permit_zone: Option<String>,
    pub curb_color: Option<String>,
    /// e.g. "Mon 8:00-10:00 1st,3rd week".
    pub sweeping_schedule: Option<String>,
    pub confidence_score: Option<f64>,
    /// Comma-separated source tags, e.g. "sfmta,osm".
    pub data_sources: Option<String>,
}

/// A paid parking meter post.
#[derive(Debug, Clone, FromRow)]
pub struct Meter {
    pub post_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// A pre-computed hourly occupancy pattern row. day_of_week is Sun=0..Sat=6
/// (the ingestion pipeline's convention, not chrono's).
#[derive(Debug, Clone, FromRow)]
pub struct HourlyPattern {
    pub occupancy_rate: f64,
    pub avg_duration: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub sample_count: i64,
}

/// One real-time signal row. Only the newest non-expired row per
/// (signal_type, neighborhood) is consulted by the online path.
#[derive(Debug, Clone, FromRow)]
pub struct RealtimeSignal {
    pub value_json: String,
    pub fetched_at: DateTime<Utc>,
}

/// Parameters for inserting a new real-time signal.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub signal_type: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub neighborhood: Option<String>,
    pub value_json: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A garage joined with its latest availability snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct GarageWithAvailability {
    pub garage_id: String,
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub total_spaces: Option<i64>,
    pub hourly_rate: Option<f64>,
    pub available_spaces: Option<i64>,
}

/// A garage point for the spatial store (no availability).
#[derive(Debug, Clone, FromRow)]
pub struct GaragePoint {
    pub garage_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// Garage metadata as fetched from the upstream feed.
#[derive(Debug, Clone)]
pub struct GarageUpsert {
    pub garage_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub total_spaces: Option<i64>,
    pub hourly_rate: Option<f64>,
    pub source: String,
}

/// Parameters for inserting a crowd report.
#[derive(Debug, Clone)]
pub struct NewCrowdReport {
    pub user_id: Option<String>,
    pub spot_id: Option<i64>,
    pub lat: f64,
    pub lng: f64,
    pub report_type: String,
    pub reported_at: DateTime<Utc>,
    pub confidence: f64,
}

/// A sign detection near a spot.
#[derive(Debug, Clone, FromRow)]
pub struct SignDetection {
    pub object_value: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// A street-sweeping schedule row for a corridor.
#[derive(Debug, Clone, FromRow)]
pub struct SweepingSchedule {
    pub side: Option<String>,
    pub weekday: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}
