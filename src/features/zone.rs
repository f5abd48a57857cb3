//! Zone classification: residential / commercial / restaurant / gym / mixed.
//!
//! Priority: per-spot override table, then the configured
//! neighborhood → zone mapping, then "mixed".

use crate::db::models::Spot;
use crate::db::queries;
use crate::features::spatial::{classify_neighborhood, name_to_key};
use crate::features::FeatureContext;

/// Determine the zone type for a spot.
pub async fn classify(ctx: &FeatureContext<'_>, spot: &Spot) -> Result<String, sqlx::Error> {
    if let Some(zone) = queries::zone_override(ctx.pool, spot.spot_id).await? {
        return Ok(zone);
    }

    if let Some(name) = spot.neighborhood.as_deref().filter(|n| !n.is_empty()) {
        let key = name_to_key(name);
        if let Some(zone) = ctx.config.zone_for_neighborhood(&key) {
            return Ok(zone.to_string());
        }
    }

    // No catalogue neighborhood: classify by coordinates
    if let (Some(name), _) = classify_neighborhood(ctx.config, spot.lat, spot.lng) {
        let key = name_to_key(&name);
        if let Some(zone) = ctx.config.zone_for_neighborhood(&key) {
            return Ok(zone.to_string());
        }
    }

    Ok("mixed".to_string())
}
