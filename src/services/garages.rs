//! SFMTA garage availability client.
//!
//! The open-data feed serves numbers as strings, so field extraction
//! coerces both representations.

use serde_json::Value;

use crate::db::models::GarageUpsert;
use crate::errors::AppError;

const DEFAULT_URL: &str = "https://data.sfgov.org/resource/uupn-yfaw.json";

/// HTTP timeout (seconds); the feed is slow.
const HTTP_TIMEOUT_SECS: u64 = 15;

/// Client for the SFMTA garage feed.
pub struct GarageClient {
    client: reqwest::Client,
    url: String,
}

fn field_f64(record: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match record.get(*key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(v) = s.parse::<f64>() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

fn field_str(record: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = record.get(*key) {
            if !s.is_empty() {
                return Some(s.clone());
            }
        }
    }
    None
}

impl GarageClient {
    pub fn from_env() -> Self {
        Self::new(DEFAULT_URL.to_string())
    }

    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, url }
    }

    /// Fetch the current garage list. Records without coordinates are
    /// dropped.
    pub async fn fetch_garages(&self) -> Result<Vec<GarageUpsert>, AppError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Garage feed request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Garage feed returned HTTP {}",
                response.status()
            )));
        }

        let records: Vec<Value> = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Garage feed parse error: {}", e)))?;

        let garages = records
            .iter()
            .filter_map(|record| {
                let lat = field_f64(record, &["latitude", "lat"])?;
                let lng = field_f64(record, &["longitude", "lng", "lon"])?;
                let garage_id = field_str(record, &["facility_id", "name"])?;
                Some(GarageUpsert {
                    name: field_str(record, &["facility_name", "name"]).unwrap_or_default(),
                    garage_id,
                    lat,
                    lng,
                    total_spaces: field_f64(record, &["total_spaces"]).map(|v| v as i64),
                    hourly_rate: field_f64(record, &["hourly_rate"]),
                    source: "sfpark".to_string(),
                })
            })
            .collect();

        Ok(garages)
    }
}
