//! YAML configuration with `${VAR}` environment expansion.
//!
//! A `.env` file next to the config (if present) is loaded first via dotenvy;
//! already-set process variables win. The YAML text is then scanned for
//! `${NAME}` references, each replaced with the variable's value before
//! deserialization, so API credentials never live in the config file itself.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::AppError;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub transfer_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub zone_defaults: BTreeMap<String, ZoneDefault>,
    #[serde(default)]
    pub neighborhoods: BTreeMap<String, Neighborhood>,
    pub realtime: RealtimeConfig,
    pub serving: ServingConfig,
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path, relative to the working directory.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Directory containing occupancy.json / turnover.json / calibration.json.
    pub artifacts_dir: String,
    #[serde(default)]
    pub occupancy: BoosterParams,
    #[serde(default)]
    pub turnover: BoosterParams,
}

/// Booster hyperparameters, a contract shared with the offline training
/// pipeline; the serving path only carries them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoosterParams {
    #[serde(default)]
    pub n_estimators: u32,
    #[serde(default)]
    pub max_depth: u32,
    #[serde(default)]
    pub learning_rate: f64,
    #[serde(default)]
    pub eval_metric: String,
    #[serde(default)]
    pub early_stopping_rounds: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub sample_rate_random: f64,
    #[serde(default)]
    pub time_slot_minutes: u32,
    #[serde(default)]
    pub train_months: u32,
    #[serde(default)]
    pub val_months: u32,
    #[serde(default)]
    pub test_months: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfidenceConfig {
    pub meter_sample_threshold: u32,
    pub realtime_fresh_minutes: f64,
    pub realtime_stale_minutes: f64,
    pub meter_data_weight: f64,
    pub spatial_data_weight: f64,
    pub realtime_freshness_weight: f64,
    pub model_certainty_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDefault {
    #[serde(default)]
    pub neighborhoods: Vec<String>,
    pub base_churn: f64,
}

/// A named circular region used to join configuration, signals, and zones.
#[derive(Debug, Clone, Deserialize)]
pub struct Neighborhood {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Poller intervals in seconds.
    pub traffic_interval: u64,
    pub weather_interval: u64,
    pub events_interval: u64,
    pub garages_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServingConfig {
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivacyConfig {
    pub pro_tier: ProTierPrivacy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProTierPrivacy {
    /// Exact coordinates within this distance of the caller.
    pub exact_within_m: f64,
    /// Jittered coordinates up to this distance.
    pub fuzzy_within_m: f64,
    /// Jitter magnitude in metres (each axis, uniform).
    pub fuzz_meters: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Transfer multiplier applied when no zone-specific value is configured.
const DEFAULT_TRANSFER_MULTIPLIER: f64 = 1.20;

/// Base churn (sessions/hour) when a zone has no configured default.
const DEFAULT_BASE_CHURN: f64 = 1.0;

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references
    /// from the process environment.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
        let expanded = expand_env_vars(&raw);
        serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Internal(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Transfer multiplier for a zone type (default 1.20).
    pub fn transfer_multiplier(&self, zone_type: &str) -> f64 {
        self.transfer_multipliers
            .get(zone_type)
            .copied()
            .unwrap_or(DEFAULT_TRANSFER_MULTIPLIER)
    }

    /// Base churn rate (sessions/hour) for a zone type.
    pub fn base_churn(&self, zone_type: &str) -> f64 {
        self.zone_defaults
            .get(zone_type)
            .map(|z| z.base_churn)
            .unwrap_or(DEFAULT_BASE_CHURN)
    }

    /// Zone type for a neighborhood key, from the configured defaults.
    pub fn zone_for_neighborhood(&self, neighborhood_key: &str) -> Option<&str> {
        self.zone_defaults.iter().find_map(|(zone, cfg)| {
            cfg.neighborhoods
                .iter()
                .any(|n| n == neighborhood_key)
                .then_some(zone.as_str())
        })
    }
}

/// Replace every `${NAME}` whose variable is set in the environment.
/// Unset references are left verbatim so a missing credential surfaces as an
/// authentication failure rather than silent empty text.
fn expand_env_vars(raw: &str) -> String {
    let mut out = raw.to_string();
    for (key, val) in std::env::vars() {
        let needle = format!("${{{}}}", key);
        if out.contains(&needle) {
            out = out.replace(&needle, &val);
        }
    }
    out
}

/// Load a `.env` file if present. Existing process variables are preserved.
pub fn load_env_file() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(_) => {} // no .env is fine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
database:
  path: data/test.db
model:
  artifacts_dir: models
confidence:
  meter_sample_threshold: 500
  realtime_fresh_minutes: 5
  realtime_stale_minutes: 60
  meter_data_weight: 0.4
  spatial_data_weight: 0.2
  realtime_freshness_weight: 0.2
  model_certainty_weight: 0.2
transfer_multipliers:
  commercial: 1.3
zone_defaults:
  residential:
    neighborhoods: [marina]
    base_churn: 0.8
realtime:
  traffic_interval: 300
  weather_interval: 900
  events_interval: 3600
  garages_interval: 600
serving:
  cache_ttl_seconds: 300
privacy:
  pro_tier:
    exact_within_m: 200
    fuzzy_within_m: 400
    fuzz_meters: 50
"#;

    fn parse(yaml: &str) -> AppConfig {
        serde_yaml::from_str(yaml).expect("config should parse")
    }

    #[test]
    fn test_minimal_config_parses() {
        let cfg = parse(MINIMAL_YAML);
        assert_eq!(cfg.database.path, "data/test.db");
        assert_eq!(cfg.serving.cache_ttl_seconds, 300);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_transfer_multiplier_lookup_and_default() {
        let cfg = parse(MINIMAL_YAML);
        assert_eq!(cfg.transfer_multiplier("commercial"), 1.3);
        assert_eq!(cfg.transfer_multiplier("gym"), 1.20);
    }

    #[test]
    fn test_base_churn_lookup_and_default() {
        let cfg = parse(MINIMAL_YAML);
        assert_eq!(cfg.base_churn("residential"), 0.8);
        assert_eq!(cfg.base_churn("unknown_zone"), 1.0);
    }

    #[test]
    fn test_zone_for_neighborhood() {
        let cfg = parse(MINIMAL_YAML);
        assert_eq!(cfg.zone_for_neighborhood("marina"), Some("residential"));
        assert_eq!(cfg.zone_for_neighborhood("atlantis"), None);
    }

    #[test]
    fn test_expand_env_vars_known() {
        // PATH is always set; the reference should disappear
        let raw = "key: ${PATH}";
        let expanded = expand_env_vars(raw);
        assert!(!expanded.contains("${PATH}"));
    }

    #[test]
    fn test_expand_env_vars_unknown_left_verbatim() {
        let raw = "key: ${CURBCAST_DEFINITELY_NOT_SET_XYZ}";
        let expanded = expand_env_vars(raw);
        assert_eq!(expanded, raw);
    }

    #[test]
    fn test_repo_config_file_parses() {
        let cfg = AppConfig::load(Path::new("config.yaml")).expect("bundled config should load");
        assert_eq!(cfg.neighborhoods.len(), 10);
        assert!(cfg.neighborhoods.contains_key("financial_district"));
        assert_eq!(cfg.realtime.traffic_interval, 300);
    }
}
