//! Street-sweeping features.
//!
//! Primary path parses the spot's pre-parsed schedule string (e.g.
//! "Mon 8:00-10:00 1st,3rd week"); when the catalogue has none, corridor
//! schedules from the sweeping table are consulted instead.

use chrono::{Datelike, NaiveDateTime, Timelike};
use regex::Regex;
use std::sync::OnceLock;

use crate::db::models::Spot;
use crate::db::queries;
use crate::features::{encode_sweeping_side, FeatureContext, FeatureMap};

/// Sentinel for "no sweeping event known in either direction".
const UNKNOWN_MINUTES: f64 = 9999.0;

/// Three-letter day names indexed by chrono's Mon=0..Sun=6.
const DOW_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn time_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2}:\d{2})\s*-\s*(\d{1,2}:\d{2})").unwrap())
}

/// Parse "8:00" / "08:00" / "8:00 AM" into minutes since midnight.
fn parse_time_minutes(t: &str) -> Option<u32> {
    let trimmed = t.trim();
    let upper = trimmed.to_uppercase();
    let body = upper.replace("AM", "").replace("PM", "");
    let mut parts = body.trim().split(':');
    let mut h: u32 = parts.next()?.trim().parse().ok()?;
    let m: u32 = parts.next()?.trim().parse().ok()?;
    if upper.contains("PM") && h < 12 {
        h += 12;
    }
    if upper.contains("AM") && h == 12 {
        h = 0;
    }
    (h < 24 && m < 60).then_some(h * 60 + m)
}

struct SweepingState {
    is_now: bool,
    minutes_until: f64,
    minutes_since: f64,
    side: String,
}

impl SweepingState {
    fn unknown() -> Self {
        Self {
            is_now: false,
            minutes_until: UNKNOWN_MINUTES,
            minutes_since: UNKNOWN_MINUTES,
            side: "none".to_string(),
        }
    }

    fn into_features(self) -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("is_sweeping_now", self.is_now as u8 as f64);
        f.insert("minutes_until_sweeping", self.minutes_until);
        f.insert("minutes_since_sweeping", self.minutes_since);
        f.insert("sweeping_side", encode_sweeping_side(&self.side));
        f
    }
}

/// Evaluate a schedule string against the current day and time.
fn from_schedule_string(schedule: &str, dow_name: &str, current_minutes: u32) -> SweepingState {
    let mut state = SweepingState::unknown();

    if !schedule.to_lowercase().contains(&dow_name.to_lowercase()) {
        return state;
    }

    let Some(caps) = time_range_regex().captures(schedule) else {
        return state;
    };
    let (Some(start), Some(end)) = (
        parse_time_minutes(&caps[1]),
        parse_time_minutes(&caps[2]),
    ) else {
        return state;
    };

    if start <= current_minutes && current_minutes <= end {
        state.is_now = true;
        state.minutes_since = (current_minutes - start) as f64;
        state.minutes_until = 0.0;
    } else if current_minutes < start {
        state.minutes_until = (start - current_minutes) as f64;
    } else {
        state.minutes_since = (current_minutes - end) as f64;
    }
    state
}

/// Compute the 4 sweeping features for a spot at a time.
pub async fn compute(
    ctx: &FeatureContext<'_>,
    spot: &Spot,
    ts: NaiveDateTime,
) -> Result<FeatureMap, sqlx::Error> {
    let dow_name = DOW_NAMES[ts.weekday().num_days_from_monday() as usize];
    let current_minutes = ts.hour() * 60 + ts.minute();

    if let Some(schedule) = spot.sweeping_schedule.as_deref() {
        if !schedule.is_empty() && schedule != "None" {
            return Ok(from_schedule_string(schedule, dow_name, current_minutes).into_features());
        }
    }

    // Fallback: corridor schedules keyed by street name
    let Some(street) = spot.street_name.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(SweepingState::unknown().into_features());
    };

    let schedules = queries::sweeping_for_street(ctx.pool, street).await?;
    let mut state = SweepingState::unknown();

    for sched in &schedules {
        let sched_day = sched.weekday.as_deref().unwrap_or("").trim();
        if sched_day.len() < 3
            || !sched_day[..3].eq_ignore_ascii_case(dow_name)
        {
            continue;
        }

        let (Some(start), Some(end)) = (
            sched.start_time.as_deref().and_then(parse_time_minutes),
            sched.end_time.as_deref().and_then(parse_time_minutes),
        ) else {
            continue;
        };

        let side = sched.side.clone().unwrap_or_default();

        if start <= current_minutes && current_minutes <= end {
            state.is_now = true;
            state.side = if side.is_empty() { "both".to_string() } else { side };
            state.minutes_since = (current_minutes - start) as f64;
            state.minutes_until = 0.0;
            break;
        } else if current_minutes < start {
            let until = (start - current_minutes) as f64;
            if until < state.minutes_until {
                state.minutes_until = until;
                state.side = if side.is_empty() { "none".to_string() } else { side };
            }
        } else {
            let since = (current_minutes - end) as f64;
            if since < state.minutes_since {
                state.minutes_since = since;
            }
        }
    }

    Ok(state.into_features())
}
