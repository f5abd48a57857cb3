//! The per-spot scoring chain.
//!
//! occupancy classifier → Platt calibration → transfer adjustment →
//! turnover regressor → time decay → confidence → guarantee level.
//!
//! Every stage has a fallback so an absent artifact degrades the output
//! instead of failing the request: occupancy falls back to the nearest
//! meter's occupancy rate, turnover to the zone's base churn, calibration
//! to identity.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::config::AppConfig;
use crate::db::models::Spot;
use crate::features::realtime::DataSourcePlugin;
use crate::features::{assemble, encode_zone_type, FeatureContext};
use crate::helpers::{round2, round3};
use crate::model::artifacts::ModelBundle;
use crate::model::calibration::Calibration;
use crate::model::confidence::{
    compute_confidence, guarantee_level, ConfidenceDetail, ConfidenceInputs,
};
use crate::model::time_decay::{time_decay_info, TimeDecayInfo};
use crate::model::transfer;

/// Version reported when no occupancy bundle is loaded.
const FALLBACK_VERSION: &str = "1.0.0";

/// The loaded artifact bundles. Read-only after startup.
pub struct ModelSet {
    pub occupancy: Option<ModelBundle>,
    pub turnover: Option<ModelBundle>,
    pub calibration: Calibration,
}

impl ModelSet {
    /// Load all bundles from the artifacts directory. Absence of any bundle
    /// is recoverable; the affected stage uses its fallback.
    pub fn load(artifacts_dir: &str) -> Self {
        let dir = Path::new(artifacts_dir);

        let occupancy = match ModelBundle::load(&dir.join("occupancy.json")) {
            Ok(bundle) => {
                tracing::info!(
                    "Loaded occupancy model {} ({} features)",
                    bundle.version,
                    bundle.feature_cols.len()
                );
                Some(bundle)
            }
            Err(e) => {
                tracing::warn!("Occupancy model unavailable, using meter fallback: {}", e);
                None
            }
        };

        let turnover = match ModelBundle::load(&dir.join("turnover.json")) {
            Ok(bundle) => {
                tracing::info!(
                    "Loaded turnover model {} ({} features)",
                    bundle.version,
                    bundle.feature_cols.len()
                );
                Some(bundle)
            }
            Err(e) => {
                tracing::warn!("Turnover model unavailable, using zone defaults: {}", e);
                None
            }
        };

        let calibration = match Calibration::load(&dir.join("calibration.json")) {
            Ok(cal) => {
                tracing::info!("Loaded calibration parameters");
                cal
            }
            Err(_) => {
                tracing::info!("No calibration file found, using raw probabilities");
                Calibration::default()
            }
        };

        Self {
            occupancy,
            turnover,
            calibration,
        }
    }

    /// An empty set where every stage runs its fallback.
    pub fn unloaded() -> Self {
        Self {
            occupancy: None,
            turnover: None,
            calibration: Calibration::default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.occupancy.is_some()
    }

    pub fn version(&self) -> &str {
        self.occupancy
            .as_ref()
            .map(|b| b.version.as_str())
            .unwrap_or(FALLBACK_VERSION)
    }
}

/// The scored output for one spot, before privacy gating.
#[derive(Debug, Clone)]
pub struct SpotScore {
    pub spot_id: i64,
    pub street: String,
    pub lat: f64,
    pub lng: f64,
    pub p_free: f64,
    pub guarantee_level: &'static str,
    pub confidence: ConfidenceDetail,
    pub time_decay: TimeDecayInfo,
    pub turnover_rate: f64,
    pub zone_type: String,
    pub restrictions: Vec<String>,
    pub neighborhood: String,
}

/// Run the full scoring chain for one spot at a time.
pub async fn predict_spot(
    ctx: &FeatureContext<'_>,
    plugins: &[Box<dyn DataSourcePlugin>],
    models: &ModelSet,
    config: &AppConfig,
    spot: &Spot,
    ts: NaiveDateTime,
) -> Result<SpotScore, sqlx::Error> {
    // Step 1: assemble features
    let mut assembled = assemble(ctx, plugins, spot, ts).await?;
    let zone_type = assembled.zone_type.clone();
    assembled
        .values
        .insert("zone_type", encode_zone_type(&zone_type));
    let features = &assembled.values;

    // Step 2: occupancy → P(occupied)
    let p_occupied = match &models.occupancy {
        Some(bundle) => bundle.score(features),
        None => {
            let nearest = features
                .get("nearest_meter_occupancy")
                .copied()
                .unwrap_or(f64::NAN);
            if nearest.is_nan() {
                0.5
            } else {
                nearest
            }
        }
    };

    // Step 3: calibration
    let p_calibrated = models.calibration.calibrate(p_occupied, &zone_type);

    // Step 4: transfer adjustment (metered → free spot)
    let multiplier = config.transfer_multiplier(&zone_type);
    let p_occupied_adj = transfer::adjust(p_calibrated, multiplier);
    let p_free = 1.0 - p_occupied_adj;

    // Step 5: turnover → sessions/hour
    let turnover_rate = match &models.turnover {
        Some(bundle) => bundle.score(features).max(0.1),
        None => config.base_churn(&zone_type).max(0.1),
    };

    // Step 6: confidence
    let has_sign = features.get("no_parking_signs_nearby").copied().unwrap_or(0.0) > 0.0
        || features.get("has_time_limit").copied().unwrap_or(0.0) > 0.0;
    let has_curb = features.get("curb_color").copied().unwrap_or(0.0) != 0.0;
    let has_official_source = spot
        .data_sources
        .as_deref()
        .map(|s| s.to_lowercase().contains("sfmta"))
        .unwrap_or(false);
    let sample_count = {
        let n = features.get("meter_sample_count").copied().unwrap_or(0.0);
        if n.is_nan() {
            0.0
        } else {
            n
        }
    };

    let confidence = compute_confidence(
        &config.confidence,
        &ConfidenceInputs {
            sample_count,
            has_sign,
            has_curb,
            has_official_source,
            signal_age_minutes: assembled.signal_age_minutes,
            p_occupied: p_occupied_adj,
        },
    );

    // Step 7: guarantee level
    let guarantee = guarantee_level(p_free, confidence.score);

    // Step 8: time decay
    let decay = time_decay_info(p_free, turnover_rate);

    // Restrictions surfaced to the user
    let mut restrictions = Vec::new();
    if features.get("is_sweeping_now").copied().unwrap_or(0.0) > 0.0 {
        restrictions.push("Street sweeping in progress".to_string());
    }
    let limit_minutes = features.get("time_limit_minutes").copied().unwrap_or(0.0);
    if features.get("has_time_limit").copied().unwrap_or(0.0) > 0.0 && limit_minutes > 0.0 {
        restrictions.push(format!("{}min time limit", limit_minutes as i64));
    }
    if features.get("is_permit_zone").copied().unwrap_or(0.0) > 0.0 {
        restrictions.push("Permit zone".to_string());
    }

    Ok(SpotScore {
        spot_id: spot.spot_id,
        street: spot.street_name.clone().unwrap_or_default(),
        lat: spot.lat,
        lng: spot.lng,
        p_free: round3(p_free),
        guarantee_level: guarantee,
        confidence,
        time_decay: decay,
        turnover_rate: round2(turnover_rate),
        zone_type,
        restrictions,
        neighborhood: spot.neighborhood.clone().unwrap_or_default(),
    })
}
