//! Real-time signal features, provided through the data-source plugin
//! registry.
//!
//! Each plugin reads the newest non-expired signal of its kind from the
//! signal cache and turns the JSON payload into features. Plugins are merged
//! in registration order; a plugin that fails contributes its NaN set so a
//! broken upstream never fails a prediction.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;

use crate::db::models::Spot;
use crate::db::queries;
use crate::features::spatial::neighborhood_key_for_spot;
use crate::features::{FeatureContext, FeatureMap};
use crate::geo::haversine;

/// Events within this radius of the spot are counted.
const EVENT_RADIUS_M: f64 = 500.0;

/// One plugin's contribution to a feature vector.
pub struct PluginOutput {
    pub features: FeatureMap,
    /// Minutes since the backing signal was fetched, when one was found.
    pub signal_age_minutes: Option<f64>,
}

/// A pluggable real-time data source.
#[async_trait]
pub trait DataSourcePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Features for a spot at a time. Implementations return their NaN set
    /// (not an error) when no current signal exists; errors are reserved for
    /// storage failures.
    async fn features(
        &self,
        ctx: &FeatureContext<'_>,
        spot: &Spot,
        ts: NaiveDateTime,
    ) -> Result<PluginOutput, sqlx::Error>;

    /// The all-NaN feature set contributed when the plugin fails.
    fn nan_features(&self) -> FeatureMap;
}

/// The default registry, in merge order.
pub fn default_registry() -> Vec<Box<dyn DataSourcePlugin>> {
    vec![
        Box::new(TrafficPlugin),
        Box::new(WeatherPlugin),
        Box::new(EventsPlugin),
    ]
}

// ---------------------------------------------------------------------------
// Signal payloads
// ---------------------------------------------------------------------------

/// Traffic payload written by the INRIX poller.
#[derive(Debug, Deserialize)]
pub struct TrafficPayload {
    pub speed_ratio: Option<f64>,
    pub congestion_level: Option<String>,
}

/// Weather payload written by the OpenWeatherMap poller.
#[derive(Debug, Deserialize)]
pub struct WeatherPayload {
    pub is_raining: Option<bool>,
    pub temperature_f: Option<f64>,
}

/// Events payload written by the Ticketmaster poller.
#[derive(Debug, Deserialize)]
pub struct EventsPayload {
    #[serde(default)]
    pub events: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EventEntry {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

fn congestion_code(level: &str) -> f64 {
    match level {
        "free" => 0.0,
        "moderate" => 1.0,
        "heavy" => 2.0,
        _ => f64::NAN,
    }
}

fn age_minutes(fetched_at: chrono::DateTime<Utc>) -> f64 {
    (Utc::now() - fetched_at).num_seconds().max(0) as f64 / 60.0
}

// ---------------------------------------------------------------------------
// Traffic
// ---------------------------------------------------------------------------

pub struct TrafficPlugin;

#[async_trait]
impl DataSourcePlugin for TrafficPlugin {
    fn name(&self) -> &'static str {
        "traffic"
    }

    async fn features(
        &self,
        ctx: &FeatureContext<'_>,
        spot: &Spot,
        _ts: NaiveDateTime,
    ) -> Result<PluginOutput, sqlx::Error> {
        let Some(key) = neighborhood_key_for_spot(ctx.config, spot) else {
            return Ok(PluginOutput {
                features: self.nan_features(),
                signal_age_minutes: None,
            });
        };

        let Some(signal) = queries::latest_signal(ctx.pool, "traffic", &key, Utc::now()).await?
        else {
            return Ok(PluginOutput {
                features: self.nan_features(),
                signal_age_minutes: None,
            });
        };

        let mut features = self.nan_features();
        if let Ok(payload) = serde_json::from_str::<TrafficPayload>(&signal.value_json) {
            features.insert("speed_ratio", payload.speed_ratio.unwrap_or(f64::NAN));
            features.insert(
                "congestion_level",
                payload
                    .congestion_level
                    .as_deref()
                    .map(congestion_code)
                    .unwrap_or(f64::NAN),
            );
            // speed_trend needs a historical diff the cache does not keep
        }

        Ok(PluginOutput {
            signal_age_minutes: Some(age_minutes(signal.fetched_at)),
            features,
        })
    }

    fn nan_features(&self) -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("speed_ratio", f64::NAN);
        f.insert("congestion_level", f64::NAN);
        f.insert("speed_trend", f64::NAN);
        f
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

pub struct WeatherPlugin;

#[async_trait]
impl DataSourcePlugin for WeatherPlugin {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn features(
        &self,
        ctx: &FeatureContext<'_>,
        _spot: &Spot,
        _ts: NaiveDateTime,
    ) -> Result<PluginOutput, sqlx::Error> {
        // Weather is city-wide; the neighborhood key is ignored
        let Some(signal) = queries::latest_signal_any_region(ctx.pool, "weather", Utc::now()).await?
        else {
            return Ok(PluginOutput {
                features: self.nan_features(),
                signal_age_minutes: None,
            });
        };

        let mut features = self.nan_features();
        if let Ok(payload) = serde_json::from_str::<WeatherPayload>(&signal.value_json) {
            features.insert(
                "is_raining",
                payload.is_raining.map(|b| b as u8 as f64).unwrap_or(f64::NAN),
            );
            features.insert("temperature_f", payload.temperature_f.unwrap_or(f64::NAN));
        }

        Ok(PluginOutput {
            signal_age_minutes: Some(age_minutes(signal.fetched_at)),
            features,
        })
    }

    fn nan_features(&self) -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("is_raining", f64::NAN);
        f.insert("temperature_f", f64::NAN);
        f
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub struct EventsPlugin;

#[async_trait]
impl DataSourcePlugin for EventsPlugin {
    fn name(&self) -> &'static str {
        "events"
    }

    async fn features(
        &self,
        ctx: &FeatureContext<'_>,
        spot: &Spot,
        _ts: NaiveDateTime,
    ) -> Result<PluginOutput, sqlx::Error> {
        let Some(key) = neighborhood_key_for_spot(ctx.config, spot) else {
            return Ok(PluginOutput {
                features: self.nan_features(),
                signal_age_minutes: None,
            });
        };

        let Some(signal) = queries::latest_signal(ctx.pool, "event", &key, Utc::now()).await? else {
            return Ok(PluginOutput {
                features: self.nan_features(),
                signal_age_minutes: None,
            });
        };

        let mut features = self.nan_features();
        if let Ok(payload) = serde_json::from_str::<EventsPayload>(&signal.value_json) {
            let nearby = payload
                .events
                .iter()
                .filter(|ev| match (ev.lat, ev.lng) {
                    (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => {
                        haversine(spot.lat, spot.lng, lat, lng) <= EVENT_RADIUS_M
                    }
                    _ => false,
                })
                .count();
            features.insert("active_events_500m", nearby as f64);
        }

        Ok(PluginOutput {
            signal_age_minutes: Some(age_minutes(signal.fetched_at)),
            features,
        })
    }

    fn nan_features(&self) -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("active_events_500m", f64::NAN);
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::memory_pool;
    use crate::db::models::NewSignal;
    use crate::spatial::{GarageIndex, MeterIndex};
    use chrono::{Duration, NaiveDate};
    use sqlx::SqlitePool;

    fn marina_spot() -> Spot {
        Spot {
            spot_id: 1,
            lat: 37.8015,
            lng: -122.4368,
            street_name: None,
            neighborhood: Some("Marina".to_string()),
            time_limit: None,
            permit_zone: None,
            curb_color: None,
            sweeping_schedule: None,
            confidence_score: None,
            data_sources: None,
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    async fn seed_signal(pool: &SqlitePool, kind: &str, neighborhood: Option<&str>, json: &str) {
        let now = Utc::now();
        queries::insert_signal(
            pool,
            &NewSignal {
                signal_type: kind.to_string(),
                lat: None,
                lng: None,
                neighborhood: neighborhood.map(|s| s.to_string()),
                value_json: json.to_string(),
                fetched_at: now - Duration::minutes(2),
                expires_at: now + Duration::minutes(10),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_traffic_plugin_reads_signal() {
        let pool = memory_pool().await;
        seed_signal(
            &pool,
            "traffic",
            Some("marina"),
            r#"{"speed_ratio":0.65,"congestion_level":"moderate"}"#,
        )
        .await;

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let meters = MeterIndex::new();
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let out = TrafficPlugin.features(&ctx, &marina_spot(), noon()).await.unwrap();
        assert_eq!(out.features["speed_ratio"], 0.65);
        assert_eq!(out.features["congestion_level"], 1.0);
        assert!(out.features["speed_trend"].is_nan());
        let age = out.signal_age_minutes.expect("signal age");
        assert!(age >= 1.9 && age < 4.0, "age {}", age);
    }

    #[tokio::test]
    async fn test_traffic_plugin_no_signal_is_nan() {
        let pool = memory_pool().await;
        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let meters = MeterIndex::new();
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let out = TrafficPlugin.features(&ctx, &marina_spot(), noon()).await.unwrap();
        assert!(out.features["speed_ratio"].is_nan());
        assert!(out.signal_age_minutes.is_none());
    }

    #[tokio::test]
    async fn test_weather_plugin_ignores_neighborhood() {
        let pool = memory_pool().await;
        seed_signal(
            &pool,
            "weather",
            Some("sf_global"),
            r#"{"is_raining":true,"temperature_f":58.0}"#,
        )
        .await;

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let meters = MeterIndex::new();
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let out = WeatherPlugin.features(&ctx, &marina_spot(), noon()).await.unwrap();
        assert_eq!(out.features["is_raining"], 1.0);
        assert_eq!(out.features["temperature_f"], 58.0);
    }

    #[tokio::test]
    async fn test_events_plugin_counts_within_500m() {
        let pool = memory_pool().await;
        // One event ~110m away, one ~5.5km away, one with zero coords
        seed_signal(
            &pool,
            "event",
            Some("marina"),
            r#"{"events":[
                {"lat":37.8025,"lng":-122.4368},
                {"lat":37.7520,"lng":-122.4368},
                {"lat":0.0,"lng":0.0}
            ],"count":3}"#,
        )
        .await;

        let cfg = AppConfig::load(std::path::Path::new("config.yaml")).unwrap();
        let meters = MeterIndex::new();
        let garages = GarageIndex::new();
        let ctx = FeatureContext {
            pool: &pool,
            config: &cfg,
            meters: &meters,
            garages: &garages,
        };

        let out = EventsPlugin.features(&ctx, &marina_spot(), noon()).await.unwrap();
        assert_eq!(out.features["active_events_500m"], 1.0);
    }

    #[test]
    fn test_congestion_codes() {
        assert_eq!(congestion_code("free"), 0.0);
        assert_eq!(congestion_code("moderate"), 1.0);
        assert_eq!(congestion_code("heavy"), 2.0);
        assert!(congestion_code("gridlock").is_nan());
    }

    #[test]
    fn test_default_registry_order() {
        let registry = default_registry();
        let names: Vec<&str> = registry.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["traffic", "weather", "events"]);
    }
}
