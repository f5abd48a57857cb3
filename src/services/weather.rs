//! OpenWeatherMap current-weather client.
//!
//! One call covers the whole city; the observation is stored as a single
//! city-wide signal. The free tier allows 1000 calls/day, far above the
//! poller's cadence.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

const DEFAULT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// City centre coordinates used for the single weather call.
pub const CITY_LAT: f64 = 37.7749;
pub const CITY_LNG: f64 = -122.4194;

/// HTTP timeout (seconds).
const HTTP_TIMEOUT_SECS: u64 = 10;

/// A weather observation stored as a signal payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub is_raining: bool,
    pub temperature_f: Option<f64>,
    pub humidity: Option<f64>,
    pub weather_main: String,
    pub weather_description: String,
    pub wind_speed_mph: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    weather: Vec<OwmWeather>,
    main: Option<OwmMain>,
    wind: Option<OwmWind>,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    main: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: Option<f64>,
}

/// Client for the OpenWeatherMap current-weather endpoint.
pub struct WeatherClient {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
}

impl WeatherClient {
    /// Build from the environment (`OPENWEATHERMAP_API_KEY`).
    pub fn from_env() -> Self {
        Self::new(std::env::var("OPENWEATHERMAP_API_KEY").ok(), DEFAULT_URL.to_string())
    }

    pub fn new(api_key: Option<String>, url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            api_key,
            url,
        }
    }

    /// Fetch the current city-wide weather. None when no API key is
    /// configured.
    pub async fn fetch(&self) -> Result<Option<WeatherObservation>, AppError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::debug!("OPENWEATHERMAP_API_KEY not configured");
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", CITY_LAT.to_string()),
                ("lon", CITY_LNG.to_string()),
                ("appid", api_key.to_string()),
                ("units", "imperial".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Weather request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Weather API returned HTTP {}",
                response.status()
            )));
        }

        let body: OwmResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Weather parse error: {}", e)))?;

        let weather_main = body
            .weather
            .first()
            .and_then(|w| w.main.clone())
            .unwrap_or_default();
        let is_raining = matches!(
            weather_main.to_lowercase().as_str(),
            "rain" | "drizzle" | "thunderstorm"
        );

        Ok(Some(WeatherObservation {
            is_raining,
            temperature_f: body.main.as_ref().and_then(|m| m.temp),
            humidity: body.main.as_ref().and_then(|m| m.humidity),
            weather_description: body
                .weather
                .first()
                .and_then(|w| w.description.clone())
                .unwrap_or_default(),
            weather_main,
            wind_speed_mph: body.wind.and_then(|w| w.speed),
        }))
    }
}
