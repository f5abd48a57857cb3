//! Background signal pollers.
//!
//! Four scheduled jobs (traffic, weather, events, garages) run on
//! independent intervals from configuration. Each job fetches from its
//! upstream, writes signal rows on success, and clears the prediction
//! cache so the next request sees fresh data. Failures are logged and the
//! job waits for its next tick; one broken upstream never affects the
//! others.
//!
//! Jobs start after the spatial stores and models have loaded and cancel
//! cleanly on the shutdown signal.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::models::NewSignal;
use crate::db::queries;
use crate::engine::Engine;
use crate::services::events::EventsClient;
use crate::services::garages::GarageClient;
use crate::services::traffic::InrixClient;
use crate::services::weather::{WeatherClient, CITY_LAT, CITY_LNG};

/// Signal validity windows per kind (minutes). Garage data has no signal
/// row; its freshness is the latest availability snapshot.
const TRAFFIC_EXPIRY_MIN: i64 = 10;
const WEATHER_EXPIRY_MIN: i64 = 30;
const EVENTS_EXPIRY_MIN: i64 = 120;

/// How long shutdown waits for jobs to finish their current cycle.
const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Handles to the running poller jobs.
pub struct Pollers {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pollers {
    /// Spawn all four jobs. Each skips the immediate first tick so startup
    /// completes before any upstream is contacted.
    pub fn start(engine: Arc<Engine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let intervals = engine.config.realtime.clone();

        let traffic_client = Arc::new(InrixClient::from_env());
        let weather_client = Arc::new(WeatherClient::from_env());
        let events_client = Arc::new(EventsClient::from_env());
        let garage_client = Arc::new(GarageClient::from_env());

        let handles = vec![
            spawn_job(
                "traffic",
                intervals.traffic_interval,
                shutdown_rx.clone(),
                {
                    let engine = engine.clone();
                    move || {
                        let engine = engine.clone();
                        let client = traffic_client.clone();
                        async move { poll_traffic(&engine, &client).await }
                    }
                },
            ),
            spawn_job(
                "weather",
                intervals.weather_interval,
                shutdown_rx.clone(),
                {
                    let engine = engine.clone();
                    move || {
                        let engine = engine.clone();
                        let client = weather_client.clone();
                        async move { poll_weather(&engine, &client).await }
                    }
                },
            ),
            spawn_job(
                "events",
                intervals.events_interval,
                shutdown_rx.clone(),
                {
                    let engine = engine.clone();
                    move || {
                        let engine = engine.clone();
                        let client = events_client.clone();
                        async move { poll_events(&engine, &client).await }
                    }
                },
            ),
            spawn_job("garages", intervals.garages_interval, shutdown_rx, {
                let engine = engine.clone();
                move || {
                    let engine = engine.clone();
                    let client = garage_client.clone();
                    async move { poll_garages(&engine, &client).await }
                }
            }),
        ];

        tracing::info!(
            "Realtime polling started — traffic: {}s, weather: {}s, events: {}s, garages: {}s",
            intervals.traffic_interval,
            intervals.weather_interval,
            intervals.events_interval,
            intervals.garages_interval,
        );

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal the jobs to stop and wait briefly for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let wait = tokio::time::timeout(
            std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS),
            join_all(self.handles),
        );
        let _ = wait.await;
        tracing::info!("Realtime polling stopped");
    }
}

fn spawn_job<F, Fut>(
    name: &'static str,
    interval_secs: u64,
    mut shutdown_rx: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        // Consume the immediate first tick; jobs run after one full period
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Poller '{}' stopping", name);
                    break;
                }
            }
        }
    })
}

/// Fetch traffic for every neighborhood in parallel and store one signal
/// per success.
pub async fn poll_traffic(engine: &Engine, client: &InrixClient) {
    let now = Utc::now();
    let expires = now + ChronoDuration::minutes(TRAFFIC_EXPIRY_MIN);

    let fetches = engine.config.neighborhoods.iter().map(|(key, nbhd)| async move {
        (key.clone(), nbhd, client.fetch_traffic(nbhd).await)
    });
    let results = join_all(fetches).await;

    let mut written = 0usize;
    for (key, nbhd, result) in results {
        let observation = match result {
            Ok(Some(obs)) => obs,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("Traffic poll failed for {}: {}", key, e);
                continue;
            }
        };
        let Ok(value_json) = serde_json::to_string(&observation) else {
            continue;
        };
        let signal = NewSignal {
            signal_type: "traffic".to_string(),
            lat: Some(nbhd.lat),
            lng: Some(nbhd.lng),
            neighborhood: Some(key.clone()),
            value_json,
            fetched_at: now,
            expires_at: expires,
        };
        match queries::insert_signal(&engine.pool, &signal).await {
            Ok(()) => written += 1,
            Err(e) => tracing::error!("Failed to store traffic signal for {}: {}", key, e),
        }
    }

    if written > 0 {
        engine.cache.invalidate_all();
        tracing::info!("Ingested traffic data for {} neighborhoods", written);
    }
}

/// Fetch the city-wide weather observation and store it as one signal.
pub async fn poll_weather(engine: &Engine, client: &WeatherClient) {
    let observation = match client.fetch().await {
        Ok(Some(obs)) => obs,
        Ok(None) => return,
        Err(e) => {
            tracing::error!("Weather poll failed: {}", e);
            return;
        }
    };

    let Ok(value_json) = serde_json::to_string(&observation) else {
        return;
    };
    let now = Utc::now();
    let signal = NewSignal {
        signal_type: "weather".to_string(),
        lat: Some(CITY_LAT),
        lng: Some(CITY_LNG),
        neighborhood: Some("sf_global".to_string()),
        value_json,
        fetched_at: now,
        expires_at: now + ChronoDuration::minutes(WEATHER_EXPIRY_MIN),
    };

    match queries::insert_signal(&engine.pool, &signal).await {
        Ok(()) => {
            engine.cache.invalidate_all();
            tracing::info!(
                "Ingested weather: {}, {:.0}°F",
                observation.weather_main,
                observation.temperature_f.unwrap_or(0.0)
            );
        }
        Err(e) => tracing::error!("Failed to store weather signal: {}", e),
    }
}

/// Fetch events per neighborhood and store one signal per non-empty list.
pub async fn poll_events(engine: &Engine, client: &EventsClient) {
    let now = Utc::now();
    let expires = now + ChronoDuration::minutes(EVENTS_EXPIRY_MIN);

    let fetches = engine.config.neighborhoods.iter().map(|(key, nbhd)| async move {
        (key.clone(), nbhd, client.fetch_events(nbhd).await)
    });
    let results = join_all(fetches).await;

    let mut written = 0usize;
    for (key, nbhd, result) in results {
        let events = match result {
            Ok(events) if !events.is_empty() => events,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("Events poll failed for {}: {}", key, e);
                continue;
            }
        };
        let payload = crate::services::events::EventsObservation {
            count: events.len(),
            events,
        };
        let Ok(value_json) = serde_json::to_string(&payload) else {
            continue;
        };
        let signal = NewSignal {
            signal_type: "event".to_string(),
            lat: Some(nbhd.lat),
            lng: Some(nbhd.lng),
            neighborhood: Some(key.clone()),
            value_json,
            fetched_at: now,
            expires_at: expires,
        };
        match queries::insert_signal(&engine.pool, &signal).await {
            Ok(()) => written += 1,
            Err(e) => tracing::error!("Failed to store event signal for {}: {}", key, e),
        }
    }

    if written > 0 {
        engine.cache.invalidate_all();
        tracing::info!("Ingested events for {} neighborhoods", written);
    }
}

/// Refresh garage metadata and append availability snapshots. Garage
/// freshness works by replacement, so no signal row is written and the
/// prediction cache is left alone.
pub async fn poll_garages(engine: &Engine, client: &GarageClient) {
    let garages = match client.fetch_garages().await {
        Ok(garages) if !garages.is_empty() => garages,
        Ok(_) => return,
        Err(e) => {
            tracing::error!("Garage poll failed: {}", e);
            return;
        }
    };

    let now = Utc::now();
    let mut stored = 0usize;
    for garage in &garages {
        if let Err(e) = queries::upsert_garage(&engine.pool, garage).await {
            tracing::error!("Failed to upsert garage {}: {}", garage.garage_id, e);
            continue;
        }
        if garage.total_spaces.is_some() {
            if let Err(e) = queries::insert_garage_availability(
                &engine.pool,
                &garage.garage_id,
                now,
                garage.total_spaces,
            )
            .await
            {
                tracing::error!(
                    "Failed to store availability for {}: {}",
                    garage.garage_id,
                    e
                );
                continue;
            }
        }
        stored += 1;
    }

    tracing::info!("Ingested {} garages", stored);
}
