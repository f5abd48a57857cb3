//! Feature assembly: ~47 named features per (spot, timestamp), drawn from
//! six families. Missing values are NaN throughout; the scoring backend
//! treats NaN as "missing" natively.

pub mod meter_patterns;
pub mod realtime;
pub mod sign_rules;
pub mod spatial;
pub mod sweeping;
pub mod temporal;
pub mod zone;

use std::collections::HashMap;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db::models::Spot;
use crate::spatial::{GarageIndex, MeterIndex};

/// Feature name → value. Categorical features are stored already encoded to
/// their fixed integer slots (see the maps below).
pub type FeatureMap = HashMap<&'static str, f64>;

/// Everything feature extractors need besides the spot itself.
pub struct FeatureContext<'a> {
    pub pool: &'a SqlitePool,
    pub config: &'a AppConfig,
    pub meters: &'a MeterIndex,
    pub garages: &'a GarageIndex,
}

/// The assembled feature vector for one (spot, timestamp), plus the
/// side-channel values the scoring chain needs in raw form.
pub struct AssembledFeatures {
    pub values: FeatureMap,
    /// Zone type as a string; encoded into `values` immediately before
    /// scoring and reported verbatim in the response.
    pub zone_type: String,
    /// Age in minutes of the freshest real-time signal backing this vector,
    /// if any plugin produced one. Feeds the confidence freshness component.
    pub signal_age_minutes: Option<f64>,
}

// Fixed categorical encodings, shared with the offline training pipeline.
// Unknown values map to slot 0, except zone_type which maps to mixed (4).

const SWEEPING_SIDE_MAP: [(&str, f64); 4] =
    [("none", 0.0), ("left", 1.0), ("right", 2.0), ("both", 3.0)];

const CURB_COLOR_MAP: [(&str, f64); 6] = [
    ("none", 0.0),
    ("green", 1.0),
    ("white", 2.0),
    ("red", 3.0),
    ("yellow", 4.0),
    ("blue", 5.0),
];

const ZONE_TYPE_MAP: [(&str, f64); 5] = [
    ("residential", 0.0),
    ("commercial", 1.0),
    ("restaurant", 2.0),
    ("gym", 3.0),
    ("mixed", 4.0),
];

pub fn encode_sweeping_side(side: &str) -> f64 {
    SWEEPING_SIDE_MAP
        .iter()
        .find(|(name, _)| *name == side)
        .map(|(_, v)| *v)
        .unwrap_or(0.0)
}

pub fn encode_curb_color(color: &str) -> f64 {
    CURB_COLOR_MAP
        .iter()
        .find(|(name, _)| *name == color)
        .map(|(_, v)| *v)
        .unwrap_or(0.0)
}

pub fn encode_zone_type(zone: &str) -> f64 {
    ZONE_TYPE_MAP
        .iter()
        .find(|(name, _)| *name == zone)
        .map(|(_, v)| *v)
        .unwrap_or(4.0)
}

/// Compute the full feature vector for a spot at a time.
///
/// Family order matches the training pipeline: temporal, spatial, meter
/// patterns, sweeping, sign rules, zone, then the real-time plugins in
/// registration order. A plugin that fails contributes its NaN set rather
/// than failing the request.
pub async fn assemble(
    ctx: &FeatureContext<'_>,
    plugins: &[Box<dyn realtime::DataSourcePlugin>],
    spot: &Spot,
    ts: NaiveDateTime,
) -> Result<AssembledFeatures, sqlx::Error> {
    let mut values = FeatureMap::new();

    values.extend(temporal::compute(ts));
    values.extend(spatial::compute(ctx, spot));
    values.extend(meter_patterns::compute(ctx, spot, ts).await?);
    values.extend(sweeping::compute(ctx, spot, ts).await?);
    values.extend(sign_rules::compute(ctx, spot).await?);

    let zone_type = zone::classify(ctx, spot).await?;

    let mut signal_age_minutes: Option<f64> = None;
    for plugin in plugins {
        match plugin.features(ctx, spot, ts).await {
            Ok(output) => {
                values.extend(output.features);
                if signal_age_minutes.is_none() {
                    signal_age_minutes = output.signal_age_minutes;
                }
            }
            Err(e) => {
                tracing::warn!("Plugin '{}' failed: {}", plugin.name(), e);
                values.extend(plugin.nan_features());
            }
        }
    }

    Ok(AssembledFeatures {
        values,
        zone_type,
        signal_age_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sweeping_side() {
        assert_eq!(encode_sweeping_side("none"), 0.0);
        assert_eq!(encode_sweeping_side("left"), 1.0);
        assert_eq!(encode_sweeping_side("both"), 3.0);
        assert_eq!(encode_sweeping_side("sideways"), 0.0);
    }

    #[test]
    fn test_encode_curb_color() {
        assert_eq!(encode_curb_color("green"), 1.0);
        assert_eq!(encode_curb_color("blue"), 5.0);
        assert_eq!(encode_curb_color("purple"), 0.0);
    }

    #[test]
    fn test_encode_zone_type_unknown_maps_to_mixed() {
        assert_eq!(encode_zone_type("commercial"), 1.0);
        assert_eq!(encode_zone_type("harbor"), 4.0);
    }
}
