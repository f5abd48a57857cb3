//! INRIX traffic client.
//!
//! Auth is a two-step flow: exchange (APP_ID, HASH_TOKEN) for a bearer
//! token at the auth endpoint, then query segment speeds per neighborhood.
//! Tokens are cached for about an hour and refreshed when expired or
//! absent. Without credentials the client is a no-op until they appear.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Neighborhood;
use crate::errors::AppError;

const DEFAULT_AUTH_URL: &str = "https://api.iq.inrix.com/auth/v1/appToken";
const DEFAULT_SPEED_URL: &str = "https://api.iq.inrix.com/traffic/inrix.php";

/// HTTP timeout for INRIX calls (seconds).
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Token lifetime assumed when INRIX doesn't say otherwise.
const TOKEN_TTL_HOURS: i64 = 1;

/// Half-degree-hundredths box edge around a neighborhood centre.
const BOX_HALF_DEG: f64 = 0.005;

/// A traffic observation for one neighborhood, stored as a signal payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficObservation {
    pub speed_ratio: f64,
    /// "free" (ratio ≥ 0.8), "moderate" (≥ 0.5), or "heavy"
    pub congestion_level: String,
    pub avg_speed_mph: f64,
    pub avg_freeflow_mph: f64,
    pub segment_count: usize,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    result: Option<AuthResult>,
}

#[derive(Debug, Deserialize)]
struct AuthResult {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeedResponse {
    result: Option<SpeedResult>,
}

#[derive(Debug, Deserialize)]
struct SpeedResult {
    #[serde(rename = "segmentSpeeds", default)]
    segment_speeds: Vec<SegmentSpeed>,
}

#[derive(Debug, Deserialize)]
struct SegmentSpeed {
    speed: Option<f64>,
    /// Free-flow reference speed
    average: Option<f64>,
}

struct CachedToken {
    token: String,
    expires: DateTime<Utc>,
}

/// Client for the INRIX speed API.
pub struct InrixClient {
    client: reqwest::Client,
    app_id: Option<String>,
    hash_token: Option<String>,
    auth_url: String,
    speed_url: String,
    token_cache: RwLock<Option<CachedToken>>,
}

impl InrixClient {
    /// Build from the environment (`APP_ID`, `HASH_TOKEN`, optional
    /// `AUTH_TOKEN_URL` override).
    pub fn from_env() -> Self {
        let auth_url =
            std::env::var("AUTH_TOKEN_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string());
        Self::new(
            std::env::var("APP_ID").ok(),
            std::env::var("HASH_TOKEN").ok(),
            auth_url,
            DEFAULT_SPEED_URL.to_string(),
        )
    }

    pub fn new(
        app_id: Option<String>,
        hash_token: Option<String>,
        auth_url: String,
        speed_url: String,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            app_id,
            hash_token,
            auth_url,
            speed_url,
            token_cache: RwLock::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.app_id.is_some() && self.hash_token.is_some()
    }

    /// Get a valid token, refreshing through the auth endpoint when the
    /// cached one is absent or expired.
    async fn token(&self) -> Result<Option<String>, AppError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires > Utc::now() {
                    return Ok(Some(cached.token.clone()));
                }
            }
        }

        let (Some(app_id), Some(hash_token)) = (self.app_id.as_deref(), self.hash_token.as_deref())
        else {
            tracing::warn!("INRIX credentials not configured (APP_ID, HASH_TOKEN)");
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.auth_url)
            .query(&[("appId", app_id), ("hashToken", hash_token)])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("INRIX auth request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "INRIX auth returned HTTP {}",
                response.status()
            )));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("INRIX auth parse error: {}", e)))?;

        let Some(token) = body.result.and_then(|r| r.token) else {
            return Err(AppError::Upstream("INRIX auth response had no token".to_string()));
        };

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires: Utc::now() + Duration::hours(TOKEN_TTL_HOURS),
        });
        Ok(Some(token))
    }

    /// Fetch the current traffic observation for a neighborhood. Returns
    /// None when unauthenticated or when INRIX reports no segments.
    pub async fn fetch_traffic(
        &self,
        nbhd: &Neighborhood,
    ) -> Result<Option<TrafficObservation>, AppError> {
        let Some(token) = self.token().await? else {
            return Ok(None);
        };

        let corner1 = format!("{}|{}", nbhd.lat - BOX_HALF_DEG, nbhd.lng - BOX_HALF_DEG);
        let corner2 = format!("{}|{}", nbhd.lat + BOX_HALF_DEG, nbhd.lng + BOX_HALF_DEG);

        let response = self
            .client
            .get(&self.speed_url)
            .query(&[
                ("Action", "GetSegmentSpeedInBox"),
                ("Token", token.as_str()),
                ("Corner1", corner1.as_str()),
                ("Corner2", corner2.as_str()),
                ("Format", "json"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("INRIX speed request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "INRIX speed returned HTTP {}",
                response.status()
            )));
        }

        let body: SpeedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("INRIX speed parse error: {}", e)))?;

        let segments = body.result.map(|r| r.segment_speeds).unwrap_or_default();
        Ok(summarize_segments(&segments))
    }
}

fn summarize_segments(segments: &[SegmentSpeed]) -> Option<TrafficObservation> {
    let speeds: Vec<f64> = segments.iter().filter_map(|s| s.speed).collect();
    if speeds.is_empty() {
        return None;
    }
    let freeflow: Vec<f64> = segments
        .iter()
        .filter_map(|s| s.average.or(s.speed))
        .collect();

    let avg_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;
    let avg_freeflow = if freeflow.is_empty() {
        avg_speed
    } else {
        freeflow.iter().sum::<f64>() / freeflow.len() as f64
    };
    let ratio = if avg_freeflow > 0.0 {
        avg_speed / avg_freeflow
    } else {
        1.0
    };

    let congestion = if ratio >= 0.8 {
        "free"
    } else if ratio >= 0.5 {
        "moderate"
    } else {
        "heavy"
    };

    Some(TrafficObservation {
        speed_ratio: (ratio * 1000.0).round() / 1000.0,
        congestion_level: congestion.to_string(),
        avg_speed_mph: (avg_speed * 10.0).round() / 10.0,
        avg_freeflow_mph: (avg_freeflow * 10.0).round() / 10.0,
        segment_count: segments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nbhd() -> Neighborhood {
        Neighborhood {
            name: "Marina".to_string(),
            lat: 37.8015,
            lng: -122.4368,
            radius_m: 1000.0,
        }
    }

    #[test]
    fn test_summarize_congestion_levels() {
        let segments = vec![SegmentSpeed {
            speed: Some(36.0),
            average: Some(40.0),
        }];
        let obs = summarize_segments(&segments).unwrap();
        assert_eq!(obs.congestion_level, "free");
        assert!((obs.speed_ratio - 0.9).abs() < 1e-9);

        let segments = vec![SegmentSpeed {
            speed: Some(24.0),
            average: Some(40.0),
        }];
        assert_eq!(summarize_segments(&segments).unwrap().congestion_level, "moderate");

        let segments = vec![SegmentSpeed {
            speed: Some(10.0),
            average: Some(40.0),
        }];
        assert_eq!(summarize_segments(&segments).unwrap().congestion_level, "heavy");
    }

    #[test]
    fn test_summarize_empty_is_none() {
        assert!(summarize_segments(&[]).is_none());
        let no_speeds = vec![SegmentSpeed {
            speed: None,
            average: Some(40.0),
        }];
        assert!(summarize_segments(&no_speeds).is_none());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_noop() {
        let client = InrixClient::new(
            None,
            None,
            "http://localhost/auth".to_string(),
            "http://localhost/speed".to_string(),
        );
        assert!(!client.has_credentials());
        let result = client.fetch_traffic(&nbhd()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_auth_then_fetch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth"))
            .and(query_param("appId", "app"))
            .and(query_param("hashToken", "hash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"token": "tok-123"}
            })))
            .expect(1) // token is cached across the two fetches
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/speed"))
            .and(query_param("Token", "tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"segmentSpeeds": [
                    {"speed": 20.0, "average": 40.0},
                    {"speed": 30.0, "average": 40.0}
                ]}
            })))
            .mount(&server)
            .await;

        let client = InrixClient::new(
            Some("app".to_string()),
            Some("hash".to_string()),
            format!("{}/auth", server.uri()),
            format!("{}/speed", server.uri()),
        );

        let obs = client.fetch_traffic(&nbhd()).await.unwrap().unwrap();
        assert_eq!(obs.segment_count, 2);
        assert_eq!(obs.congestion_level, "moderate");

        // Second fetch reuses the cached token (auth mock expects one call)
        let again = client.fetch_traffic(&nbhd()).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn test_auth_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = InrixClient::new(
            Some("app".to_string()),
            Some("bad".to_string()),
            format!("{}/auth", server.uri()),
            format!("{}/speed", server.uri()),
        );

        let result = client.fetch_traffic(&nbhd()).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }
}
