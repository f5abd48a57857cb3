//! Exponential time decay: predictions drift toward 0.5 as time passes.
//!
//! `half_life = 60 / turnover_rate` minutes,
//! `decay_factor = exp(-ln2 · elapsed / half_life)`,
//! `p(t) = 0.5 + (p₀ - 0.5) · decay_factor`.
//!
//! A prediction is stale once its decay factor drops below 0.3.

use serde::Serialize;
use utoipa::ToSchema;

use crate::helpers::{round1, round3};

/// Turnover floor guaranteeing a defined half-life.
const MIN_TURNOVER: f64 = 0.1;

/// Decay factor below which a prediction is considered stale.
const STALE_FACTOR: f64 = 0.3;

/// Decayed P(free) at the standard future horizons.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FutureConfidence {
    #[serde(rename = "1min")]
    pub one_min: f64,
    #[serde(rename = "3min")]
    pub three_min: f64,
    #[serde(rename = "5min")]
    pub five_min: f64,
    #[serde(rename = "10min")]
    pub ten_min: f64,
}

/// Full decay information attached to a prediction.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimeDecayInfo {
    /// Minutes for the prediction's information to halve toward 0.5
    pub half_life_minutes: f64,
    /// Minutes until the decay factor drops below 0.3
    pub valid_for_minutes: f64,
    pub future_confidence: FutureConfidence,
}

/// Half-life in minutes for a turnover rate (sessions/hour).
pub fn half_life_minutes(turnover_rate: f64) -> f64 {
    60.0 / turnover_rate.max(MIN_TURNOVER)
}

/// Decay factor after `elapsed_minutes`.
pub fn decay_factor(elapsed_minutes: f64, turnover_rate: f64) -> f64 {
    let hl = half_life_minutes(turnover_rate);
    (-std::f64::consts::LN_2 * elapsed_minutes / hl).exp()
}

/// Decayed prediction: drifts toward 0.5 (maximum uncertainty).
pub fn apply_decay(p_original: f64, elapsed_minutes: f64, turnover_rate: f64) -> f64 {
    0.5 + (p_original - 0.5) * decay_factor(elapsed_minutes, turnover_rate)
}

/// Whether a prediction has gone stale after `elapsed_minutes`.
pub fn is_stale(elapsed_minutes: f64, turnover_rate: f64) -> bool {
    decay_factor(elapsed_minutes, turnover_rate) < STALE_FACTOR
}

/// Decayed P(free) at 1/3/5/10 minutes, rounded to 3 decimals.
pub fn future_confidence(p_free: f64, turnover_rate: f64) -> FutureConfidence {
    FutureConfidence {
        one_min: round3(apply_decay(p_free, 1.0, turnover_rate)),
        three_min: round3(apply_decay(p_free, 3.0, turnover_rate)),
        five_min: round3(apply_decay(p_free, 5.0, turnover_rate)),
        ten_min: round3(apply_decay(p_free, 10.0, turnover_rate)),
    }
}

/// Full decay information for a prediction.
pub fn time_decay_info(p_free: f64, turnover_rate: f64) -> TimeDecayInfo {
    let hl = half_life_minutes(turnover_rate);
    // Solve 0.3 = exp(-ln2 · t / hl) for t
    let valid_minutes = hl * (-STALE_FACTOR.ln() / std::f64::consts::LN_2);

    TimeDecayInfo {
        half_life_minutes: round1(hl),
        valid_for_minutes: round1(valid_minutes),
        future_confidence: future_confidence(p_free, turnover_rate),
    }
}
