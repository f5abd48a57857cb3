use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{
    GaragePoint, GarageUpsert, GarageWithAvailability, HourlyPattern, Meter, NewCrowdReport,
    NewSignal, RealtimeSignal, SignDetection, Spot, SweepingSchedule,
};

// ---------------------------------------------------------------------------
// Catalogue bulk loads (startup)
// ---------------------------------------------------------------------------

/// Load the full curb-spot catalogue. Rows without coordinates are excluded
/// at the SQL level so the spatial index never sees them.
pub async fn load_spots(pool: &SqlitePool) -> Result<Vec<Spot>, sqlx::Error> {
    sqlx::query_as::<_, Spot>(
        "SELECT spot_id, lat, lng, street_name, neighborhood,
                time_limit, permit_zone, curb_color, sweeping_schedule,
                confidence_score, data_sources
         FROM curb_spots
         WHERE lat IS NOT NULL AND lng IS NOT NULL",
    )
    .fetch_all(pool)
    .await
}

/// Load all parking meter posts.
pub async fn load_meters(pool: &SqlitePool) -> Result<Vec<Meter>, sqlx::Error> {
    sqlx::query_as::<_, Meter>(
        "SELECT post_id, lat, lng FROM parking_meters WHERE lat IS NOT NULL",
    )
    .fetch_all(pool)
    .await
}

/// Load all garage coordinates for the garage spatial store.
pub async fn load_garage_points(pool: &SqlitePool) -> Result<Vec<GaragePoint>, sqlx::Error> {
    sqlx::query_as::<_, GaragePoint>(
        "SELECT garage_id, lat, lng FROM garages WHERE lat IS NOT NULL AND lng IS NOT NULL",
    )
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Hourly meter patterns
// ---------------------------------------------------------------------------

/// Look up the occupancy pattern for a meter at (dow, hour, month).
///
/// Tries the month-specific row first, then falls back to the all-month
/// aggregate (month IS NULL). `dow` uses the stored Sun=0..Sat=6 convention;
/// callers convert from chrono's Mon=0 before calling.
pub async fn hourly_pattern(
    pool: &SqlitePool,
    meter_post_id: &str,
    dow: u32,
    hour: u32,
    month: Option<u32>,
) -> Result<Option<HourlyPattern>, sqlx::Error> {
    if let Some(m) = month {
        let row = sqlx::query_as::<_, HourlyPattern>(
            "SELECT occupancy_rate, avg_duration, turnover_rate, sample_count
             FROM meter_occupancy_hourly
             WHERE meter_post_id = ? AND day_of_week = ? AND hour = ? AND month = ?",
        )
        .bind(meter_post_id)
        .bind(dow)
        .bind(hour)
        .bind(m)
        .fetch_optional(pool)
        .await?;
        if row.is_some() {
            return Ok(row);
        }
    }

    sqlx::query_as::<_, HourlyPattern>(
        "SELECT occupancy_rate, avg_duration, turnover_rate, sample_count
         FROM meter_occupancy_hourly
         WHERE meter_post_id = ? AND day_of_week = ? AND hour = ? AND month IS NULL",
    )
    .bind(meter_post_id)
    .bind(dow)
    .bind(hour)
    .fetch_optional(pool)
    .await
}

/// All-month occupancy rate for the hour preceding (dow, hour), for the
/// occupancy-trend feature.
pub async fn prior_hour_occupancy(
    pool: &SqlitePool,
    meter_post_id: &str,
    dow: u32,
    hour: u32,
) -> Result<Option<f64>, sqlx::Error> {
    let prior_hour = (hour + 23) % 24;
    let prior_dow = if hour == 0 { (dow + 6) % 7 } else { dow };

    let row: Option<(f64,)> = sqlx::query_as(
        "SELECT occupancy_rate FROM meter_occupancy_hourly
         WHERE meter_post_id = ? AND day_of_week = ? AND hour = ? AND month IS NULL",
    )
    .bind(meter_post_id)
    .bind(prior_dow)
    .bind(prior_hour)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

// ---------------------------------------------------------------------------
// Real-time signals
// ---------------------------------------------------------------------------

/// Newest non-expired signal for a (kind, neighborhood) pair.
pub async fn latest_signal(
    pool: &SqlitePool,
    signal_type: &str,
    neighborhood: &str,
    now: DateTime<Utc>,
) -> Result<Option<RealtimeSignal>, sqlx::Error> {
    sqlx::query_as::<_, RealtimeSignal>(
        "SELECT value_json, fetched_at FROM realtime_signals
         WHERE signal_type = ? AND neighborhood = ? AND expires_at > ?
         ORDER BY fetched_at DESC LIMIT 1",
    )
    .bind(signal_type)
    .bind(neighborhood)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Newest non-expired signal of a kind regardless of region (weather is
/// city-wide).
pub async fn latest_signal_any_region(
    pool: &SqlitePool,
    signal_type: &str,
    now: DateTime<Utc>,
) -> Result<Option<RealtimeSignal>, sqlx::Error> {
    sqlx::query_as::<_, RealtimeSignal>(
        "SELECT value_json, fetched_at FROM realtime_signals
         WHERE signal_type = ? AND expires_at > ?
         ORDER BY fetched_at DESC LIMIT 1",
    )
    .bind(signal_type)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Append a signal row. Older rows become history; readers only take the
/// newest per (kind, neighborhood).
pub async fn insert_signal(pool: &SqlitePool, signal: &NewSignal) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO realtime_signals
         (signal_type, lat, lng, neighborhood, value_json, fetched_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&signal.signal_type)
    .bind(signal.lat)
    .bind(signal.lng)
    .bind(&signal.neighborhood)
    .bind(&signal.value_json)
    .bind(signal.fetched_at)
    .bind(signal.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Garages
// ---------------------------------------------------------------------------

/// All garages joined with their latest availability snapshot.
pub async fn garages_with_latest_availability(
    pool: &SqlitePool,
) -> Result<Vec<GarageWithAvailability>, sqlx::Error> {
    sqlx::query_as::<_, GarageWithAvailability>(
        "SELECT g.garage_id, g.name, g.lat, g.lng, g.total_spaces, g.hourly_rate,
                ga.available_spaces
         FROM garages g
         LEFT JOIN garage_availability ga ON g.garage_id = ga.garage_id
           AND ga.timestamp = (SELECT MAX(timestamp) FROM garage_availability
                               WHERE garage_id = g.garage_id)
         WHERE g.lat IS NOT NULL AND g.lng IS NOT NULL",
    )
    .fetch_all(pool)
    .await
}

/// Insert or replace a garage's metadata.
pub async fn upsert_garage(pool: &SqlitePool, garage: &GarageUpsert) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR REPLACE INTO garages
         (garage_id, name, lat, lng, total_spaces, hourly_rate, source)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&garage.garage_id)
    .bind(&garage.name)
    .bind(garage.lat)
    .bind(garage.lng)
    .bind(garage.total_spaces)
    .bind(garage.hourly_rate)
    .bind(&garage.source)
    .execute(pool)
    .await?;
    Ok(())
}

/// Append an availability snapshot, deduplicated by (garage, timestamp).
pub async fn insert_garage_availability(
    pool: &SqlitePool,
    garage_id: &str,
    timestamp: DateTime<Utc>,
    available_spaces: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO garage_availability (garage_id, timestamp, available_spaces)
         VALUES (?, ?, ?)",
    )
    .bind(garage_id)
    .bind(timestamp)
    .bind(available_spaces)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Crowd reports
// ---------------------------------------------------------------------------

/// Insert a crowd report and return its server-assigned id.
pub async fn insert_crowd_report(
    pool: &SqlitePool,
    report: &NewCrowdReport,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO crowd_reports
         (user_id, spot_id, lat, lng, report_type, reported_at, confidence)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING report_id",
    )
    .bind(&report.user_id)
    .bind(report.spot_id)
    .bind(report.lat)
    .bind(report.lng)
    .bind(&report.report_type)
    .bind(report.reported_at)
    .bind(report.confidence)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

// ---------------------------------------------------------------------------
// Zone overrides, signs, sweeping
// ---------------------------------------------------------------------------

/// Per-spot zone override, if one has been recorded.
pub async fn zone_override(
    pool: &SqlitePool,
    spot_id: i64,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT zone_type FROM zone_classifications WHERE spot_id = ?")
            .bind(spot_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|r| r.0))
}

/// Sign detections inside a lat/lng bounding box (prefilter; callers apply
/// the exact haversine cut).
pub async fn signs_in_bbox(
    pool: &SqlitePool,
    lat_min: f64,
    lat_max: f64,
    lng_min: f64,
    lng_max: f64,
) -> Result<Vec<SignDetection>, sqlx::Error> {
    sqlx::query_as::<_, SignDetection>(
        "SELECT object_value, lat, lng FROM sign_detections
         WHERE lat BETWEEN ? AND ? AND lng BETWEEN ? AND ?",
    )
    .bind(lat_min)
    .bind(lat_max)
    .bind(lng_min)
    .bind(lng_max)
    .fetch_all(pool)
    .await
}

/// Sweeping schedules whose corridor matches a street name.
pub async fn sweeping_for_street(
    pool: &SqlitePool,
    street_name: &str,
) -> Result<Vec<SweepingSchedule>, sqlx::Error> {
    sqlx::query_as::<_, SweepingSchedule>(
        "SELECT side, weekday, start_time, end_time FROM street_sweeping
         WHERE corridor LIKE ? LIMIT 20",
    )
    .bind(format!("%{}%", street_name))
    .fetch_all(pool)
    .await
}
