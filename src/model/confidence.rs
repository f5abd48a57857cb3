//! Multi-source confidence scoring and the user-facing guarantee level.
//!
//! The confidence score is a configured weighted sum of four components,
//! each in [0, 1]: meter data volume, spatial/regulatory data presence,
//! real-time signal freshness, and model certainty.

use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConfidenceConfig;
use crate::helpers::round3;

/// Component breakdown attached to a prediction.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfidenceSources {
    pub meter_data: f64,
    pub spatial_data: f64,
    pub realtime_freshness: f64,
    pub model_certainty: f64,
}

/// Overall confidence for a prediction.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfidenceDetail {
    pub score: f64,
    /// "high" (≥0.7), "medium" (≥0.4), or "low"
    pub tier: String,
    pub sources: ConfidenceSources,
}

/// Inputs to the confidence computation, gathered by the ensemble.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceInputs {
    pub sample_count: f64,
    pub has_sign: bool,
    pub has_curb: bool,
    pub has_official_source: bool,
    pub signal_age_minutes: Option<f64>,
    pub p_occupied: f64,
}

/// Quality score from the volume of meter data backing the prediction.
pub fn meter_data_quality(sample_count: f64, threshold: u32) -> f64 {
    if threshold == 0 {
        return 1.0;
    }
    (sample_count.max(0.0) / threshold as f64).min(1.0)
}

/// Quality score from available spatial/regulatory data.
pub fn spatial_data_quality(has_sign: bool, has_curb: bool, has_official_source: bool) -> f64 {
    let mut score = 0.0;
    if has_sign {
        score += 0.4;
    }
    if has_curb {
        score += 0.3;
    }
    if has_official_source {
        score += 0.3;
    }
    score
}

/// Freshness score: 1 up to `fresh_minutes`, 0 from `stale_minutes`, linear
/// between; 0 when the signal age is unknown.
pub fn realtime_freshness(signal_age_minutes: Option<f64>, fresh_minutes: f64, stale_minutes: f64) -> f64 {
    let Some(age) = signal_age_minutes else {
        return 0.0;
    };
    if age <= fresh_minutes {
        return 1.0;
    }
    if age >= stale_minutes {
        return 0.0;
    }
    1.0 - (age - fresh_minutes) / (stale_minutes - fresh_minutes)
}

/// Model certainty: `1 - 2·|p - 0.5|`. This peaks at p = 0.5 and reaches 0
/// at the extremes, the inverse of the usual reading. The training
/// pipeline was fitted against this definition, so it stays as-is; see the
/// release notes.
pub fn model_certainty(p_occupied: f64) -> f64 {
    1.0 - 2.0 * (p_occupied - 0.5).abs()
}

/// Compute the overall confidence score and its component breakdown.
pub fn compute_confidence(cfg: &ConfidenceConfig, inputs: &ConfidenceInputs) -> ConfidenceDetail {
    let meter_q = meter_data_quality(inputs.sample_count, cfg.meter_sample_threshold);
    let spatial_q = spatial_data_quality(inputs.has_sign, inputs.has_curb, inputs.has_official_source);
    let freshness = realtime_freshness(
        inputs.signal_age_minutes,
        cfg.realtime_fresh_minutes,
        cfg.realtime_stale_minutes,
    );
    let certainty = model_certainty(inputs.p_occupied);

    let score = cfg.meter_data_weight * meter_q
        + cfg.spatial_data_weight * spatial_q
        + cfg.realtime_freshness_weight * freshness
        + cfg.model_certainty_weight * certainty;

    let tier = if score >= 0.7 {
        "high"
    } else if score >= 0.4 {
        "medium"
    } else {
        "low"
    };

    ConfidenceDetail {
        score: round3(score),
        tier: tier.to_string(),
        sources: ConfidenceSources {
            meter_data: round3(meter_q),
            spatial_data: round3(spatial_q),
            realtime_freshness: round3(freshness),
            model_certainty: round3(certainty),
        },
    }
}

/// Guarantee level from (P(free), confidence score).
pub fn guarantee_level(p_free: f64, confidence_score: f64) -> &'static str {
    if p_free >= 0.95 && confidence_score >= 0.8 {
        "guaranteed"
    } else if p_free >= 0.7 && confidence_score >= 0.6 {
        "probable"
    } else if p_free >= 0.3 {
        "possible"
    } else {
        "unlikely"
    }
}
