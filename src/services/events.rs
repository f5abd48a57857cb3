//! Ticketmaster Discovery client.
//!
//! Searches for events starting within the next few hours around each
//! neighborhood centre. The per-neighborhood event list is stored as one
//! signal payload; the features layer counts events near each spot.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Neighborhood;
use crate::errors::AppError;

const DEFAULT_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";

/// HTTP timeout (seconds).
const HTTP_TIMEOUT_SECS: u64 = 10;

/// How far ahead to search for events (hours).
const LOOKAHEAD_HOURS: i64 = 6;

/// Search radius around a neighborhood centre (km).
const SEARCH_RADIUS_KM: i64 = 1;

/// Maximum events per neighborhood.
const PAGE_SIZE: usize = 20;

/// One event as stored in a signal payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub venue: String,
    pub start_time: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

/// The full events payload for a neighborhood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsObservation {
    pub events: Vec<EventRecord>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
struct TmResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<TmEmbedded>,
}

#[derive(Debug, Deserialize)]
struct TmEmbedded {
    #[serde(default)]
    events: Vec<TmEvent>,
}

#[derive(Debug, Deserialize)]
struct TmEvent {
    name: Option<String>,
    dates: Option<TmDates>,
    #[serde(rename = "_embedded")]
    embedded: Option<TmEventEmbedded>,
}

#[derive(Debug, Deserialize)]
struct TmDates {
    start: Option<TmStart>,
}

#[derive(Debug, Deserialize)]
struct TmStart {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmEventEmbedded {
    #[serde(default)]
    venues: Vec<TmVenue>,
}

#[derive(Debug, Deserialize)]
struct TmVenue {
    name: Option<String>,
    location: Option<TmLocation>,
}

#[derive(Debug, Deserialize)]
struct TmLocation {
    latitude: Option<String>,
    longitude: Option<String>,
}

/// Client for the Ticketmaster Discovery API.
pub struct EventsClient {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
}

impl EventsClient {
    /// Build from the environment (`TICKETMASTER_API_KEY`).
    pub fn from_env() -> Self {
        Self::new(std::env::var("TICKETMASTER_API_KEY").ok(), DEFAULT_URL.to_string())
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

    /// Events starting within the lookahead window near a neighborhood.
    /// Empty when no API key is configured.
    pub async fn fetch_events(&self, nbhd: &Neighborhood) -> Result<Vec<EventRecord>, AppError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };

        let now = Utc::now();
        let end = now + Duration::hours(LOOKAHEAD_HOURS);

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("apikey", api_key.to_string()),
                ("latlong", format!("{},{}", nbhd.lat, nbhd.lng)),
                ("radius", SEARCH_RADIUS_KM.to_string()),
                ("unit", "km".to_string()),
                ("startDateTime", now.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                ("endDateTime", end.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                ("size", PAGE_SIZE.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Ticketmaster request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Ticketmaster returned HTTP {}",
                response.status()
            )));
        }

        let body: TmResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Ticketmaster parse error: {}", e)))?;

        let events = body
            .embedded
            .map(|e| e.events)
            .unwrap_or_default()
            .into_iter()
            .map(|event| {
                let venue = event.embedded.and_then(|e| e.venues.into_iter().next());
                let location = venue.as_ref().and_then(|v| v.location.as_ref());
                EventRecord {
                    name: event.name.unwrap_or_default(),
                    venue: venue.as_ref().and_then(|v| v.name.clone()).unwrap_or_default(),
                    start_time: event.dates.and_then(|d| d.start).and_then(|s| s.date_time),
                    lat: location
                        .and_then(|l| l.latitude.as_deref())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0.0),
                    lng: location
                        .and_then(|l| l.longitude.as_deref())
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0.0),
                }
            })
            .collect();

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nbhd() -> Neighborhood {
        Neighborhood {
            name: "Mission".to_string(),
            lat: 37.7599,
            lng: -122.4148,
            radius_m: 1500.0,
        }
    }

    #[tokio::test]
    async fn test_missing_key_returns_empty() {
        let client = EventsClient::new(None, "http://localhost/events".to_string());
        assert!(client.fetch_events(&nbhd()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("unit", "km"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_embedded": {
                    "events": [{
                        "name": "Concert",
                        "dates": {"start": {"dateTime": "2024-06-03T20:00:00Z"}},
                        "_embedded": {
                            "venues": [{
                                "name": "The Chapel",
                                "location": {"latitude": "37.7601", "longitude": "-122.4211"}
                            }]
                        }
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = EventsClient::new(
            Some("key".to_string()),
            format!("{}/events", server.uri()),
        );
        let events = client.fetch_events(&nbhd()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Concert");
        assert_eq!(events[0].venue, "The Chapel");
        assert!((events[0].lat - 37.7601).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_embedded_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"page": {}})))
            .mount(&server)
            .await;

        let client = EventsClient::new(
            Some("key".to_string()),
            format!("{}/events", server.uri()),
        );
        assert!(client.fetch_events(&nbhd()).await.unwrap().is_empty());
    }
}
