//! SQLite schema and access helpers.
//!
//! The database is shared with the offline ingestion pipeline; the serving
//! path only reads the catalogue tables and writes signals and crowd
//! reports. WAL journal mode gives snapshot reads to request handlers while
//! the pollers write.

pub mod models;
pub mod queries;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;

/// Serving-path tables, created idempotently at startup. The catalogue
/// tables (`curb_spots`, `parking_meters`, `sign_detections`,
/// `street_sweeping`) are populated by the offline ingestion pipeline;
/// they are created here too so a fresh database boots cleanly.
const SCHEMA: &str = r#"
-- Static curb-spot catalogue
CREATE TABLE IF NOT EXISTS curb_spots (
    spot_id             INTEGER PRIMARY KEY,
    lat                 REAL NOT NULL,
    lng                 REAL NOT NULL,
    street_name         TEXT,
    neighborhood        TEXT,
    time_limit          TEXT,
    permit_zone         TEXT,
    curb_color          TEXT,
    sweeping_schedule   TEXT,
    confidence_score    REAL,
    data_sources        TEXT
);

-- Paid parking meters
CREATE TABLE IF NOT EXISTS parking_meters (
    post_id     TEXT PRIMARY KEY,
    lat         REAL NOT NULL,
    lng         REAL NOT NULL,
    corridor    TEXT
);

-- Pre-computed hourly occupancy patterns (derived offline from transactions).
-- month NULL rows are the all-month aggregate; both exist per (post, dow, hour).
CREATE TABLE IF NOT EXISTS meter_occupancy_hourly (
    meter_post_id   TEXT NOT NULL,
    day_of_week     INTEGER NOT NULL,
    hour            INTEGER NOT NULL,
    month           INTEGER,
    occupancy_rate  REAL NOT NULL,
    avg_duration    REAL,
    turnover_rate   REAL,
    sample_count    INTEGER NOT NULL,
    PRIMARY KEY (meter_post_id, day_of_week, hour, month)
);

-- Per-spot zone overrides (hand-labelled or learned)
CREATE TABLE IF NOT EXISTS zone_classifications (
    spot_id         INTEGER PRIMARY KEY,
    zone_type       TEXT NOT NULL,
    confidence      REAL,
    classified_by   TEXT
);

-- Real-time signal cache; rows are history, readers take the newest
-- non-expired per (signal_type, neighborhood)
CREATE TABLE IF NOT EXISTS realtime_signals (
    signal_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    signal_type     TEXT NOT NULL,
    lat             REAL,
    lng             REAL,
    neighborhood    TEXT,
    value_json      TEXT NOT NULL,
    fetched_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rt_type_expires ON realtime_signals(signal_type, expires_at);

-- Off-street garages + append-only availability stream
CREATE TABLE IF NOT EXISTS garages (
    garage_id       TEXT PRIMARY KEY,
    name            TEXT,
    lat             REAL,
    lng             REAL,
    total_spaces    INTEGER,
    hourly_rate     REAL,
    source          TEXT
);
CREATE TABLE IF NOT EXISTS garage_availability (
    garage_id        TEXT NOT NULL,
    timestamp        TEXT NOT NULL,
    available_spaces INTEGER,
    PRIMARY KEY (garage_id, timestamp)
);

-- Crowd reports (append-only)
CREATE TABLE IF NOT EXISTS crowd_reports (
    report_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         TEXT,
    spot_id         INTEGER,
    lat             REAL,
    lng             REAL,
    report_type     TEXT,
    reported_at     TEXT NOT NULL,
    confidence      REAL
);

-- Street-sign detections (imagery pipeline output)
CREATE TABLE IF NOT EXISTS sign_detections (
    detection_id    INTEGER PRIMARY KEY,
    object_value    TEXT,
    lat             REAL,
    lng             REAL
);
CREATE INDEX IF NOT EXISTS idx_sign_lat_lng ON sign_detections(lat, lng);

-- Street sweeping schedules by corridor
CREATE TABLE IF NOT EXISTS street_sweeping (
    corridor        TEXT,
    side            TEXT,
    weekday         TEXT,
    week_of_month   TEXT,
    start_time      TEXT,
    end_time        TEXT,
    holidays        TEXT
);
"#;

/// Open the SQLite pool, creating the database file if missing.
pub async fn connect(path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| sqlx::Error::Io(e))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect_with(options)
        .await
}

/// Create all serving-path tables. Idempotent: starting up twice on the same
/// database is a no-op.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("Database schema initialized");
    Ok(())
}

/// Trivial connectivity check for the health endpoint.
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // A multi-connection pool on :memory: would open independent databases,
    // so tests pin the pool to a single connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    init_schema(&pool).await.expect("schema init");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_init_idempotent() {
        let pool = memory_pool().await;
        // Second init must succeed without error
        init_schema(&pool).await.expect("re-init should be a no-op");
    }

    #[tokio::test]
    async fn test_ping() {
        let pool = memory_pool().await;
        assert!(ping(&pool).await);
    }
}
