//! Sign and regulation features: time limits, permit zones, curb colour,
//! and no-parking sign detections near the spot.

use regex::Regex;
use std::sync::OnceLock;

use crate::db::models::Spot;
use crate::db::queries;
use crate::features::{encode_curb_color, FeatureContext, FeatureMap};
use crate::geo::{haversine, meters_to_degrees};

/// Radius for sign-detection aggregation.
const SIGN_RADIUS_M: f64 = 30.0;

/// Default time limit assigned when a limit sign is detected but the
/// catalogue carries no parseable limit string.
const DETECTED_LIMIT_DEFAULT_MIN: f64 = 120.0;

/// Sign ontology values that indicate no-parking.
const NO_PARKING_TYPES: [&str; 4] = [
    "regulatory--no-parking--g1",
    "regulatory--no-parking--g2",
    "regulatory--no-stopping-or-standing--g1",
    "regulatory--no-standing-or-parking--g1",
];

/// Sign ontology values that indicate a time limit.
const TIME_LIMIT_TYPES: [&str; 2] = [
    "regulatory--parking-restrictions--g1",
    "regulatory--maximum-duration-parking--g1",
];

fn time_limit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*(hour|hr|min)").unwrap())
}

/// Parse a catalogue time-limit string like "2 hours" or "30 min" into
/// minutes. Returns None if no limit is expressed.
fn parse_time_limit_minutes(raw: &str) -> Option<f64> {
    let lowered = raw.to_lowercase();
    let caps = time_limit_regex().captures(&lowered)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = &caps[2];
    Some(if unit.starts_with("hour") || unit.starts_with("hr") {
        value * 60.0
    } else {
        value
    })
}

fn is_meaningful(field: Option<&str>) -> bool {
    matches!(field, Some(s) if !s.is_empty() && s != "None" && s != "none")
}

/// Compute the 5 sign-rule features for a spot. Time-invariant.
pub async fn compute(ctx: &FeatureContext<'_>, spot: &Spot) -> Result<FeatureMap, sqlx::Error> {
    let mut has_time_limit = false;
    let mut time_limit_minutes = 0.0;

    if is_meaningful(spot.time_limit.as_deref()) {
        has_time_limit = true;
        if let Some(minutes) = parse_time_limit_minutes(spot.time_limit.as_deref().unwrap()) {
            time_limit_minutes = minutes;
        }
    }

    let is_permit_zone = is_meaningful(spot.permit_zone.as_deref());

    // Bounding-box prefilter in SQL, exact haversine cut here
    let (lat_off, lng_off) = meters_to_degrees(SIGN_RADIUS_M, spot.lat);
    let signs = queries::signs_in_bbox(
        ctx.pool,
        spot.lat - lat_off,
        spot.lat + lat_off,
        spot.lng - lng_off,
        spot.lng + lng_off,
    )
    .await?;

    let mut no_parking_count = 0u32;
    for sign in &signs {
        let (Some(lat), Some(lng)) = (sign.lat, sign.lng) else {
            continue;
        };
        if haversine(spot.lat, spot.lng, lat, lng) > SIGN_RADIUS_M {
            continue;
        }
        let value = sign.object_value.as_deref().unwrap_or("");
        if NO_PARKING_TYPES.contains(&value) {
            no_parking_count += 1;
        }
        if TIME_LIMIT_TYPES.contains(&value) && !has_time_limit {
            has_time_limit = true;
            time_limit_minutes = DETECTED_LIMIT_DEFAULT_MIN;
        }
    }

    let curb = match spot.curb_color.as_deref() {
        Some(c) => {
            let lower = c.to_lowercase();
            if ["green", "white", "red", "yellow", "blue"].contains(&lower.as_str()) {
                lower
            } else {
                "none".to_string()
            }
        }
        None => "none".to_string(),
    };

    let mut f = FeatureMap::new();
    f.insert("has_time_limit", has_time_limit as u8 as f64);
    f.insert("time_limit_minutes", time_limit_minutes);
    f.insert("is_permit_zone", is_permit_zone as u8 as f64);
    f.insert("curb_color", encode_curb_color(&curb));
    f.insert("no_parking_signs_nearby", no_parking_count as f64);
    Ok(f)
}
