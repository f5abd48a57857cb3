//! TTL cache for prediction responses.
//!
//! Keyed on rounded location, date, 15-minute time bucket, and radius.
//! Entries expire by TTL; the pollers and the crowd-report path clear the
//! whole cache when signals change. Eviction on overflow is insertion-order.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Timelike};

/// Maximum number of cached responses.
const MAX_ENTRIES: usize = 4096;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    insertion_order: VecDeque<String>,
}

/// Thread-safe TTL cache. Bulk invalidation is atomic with respect to
/// single-key reads.
pub struct PredictionCache<V> {
    inner: Mutex<CacheInner<V>>,
    ttl: Duration,
}

/// Build the cache key from location, time bucket, and radius.
pub fn make_key(lat: f64, lng: f64, timestamp: NaiveDateTime, radius_m: f64) -> String {
    let lat_r = (lat * 1000.0).round() / 1000.0;
    let lng_r = (lng * 1000.0).round() / 1000.0;
    let bucket = timestamp.hour() * 4 + timestamp.minute() / 15;
    format!(
        "{}:{}:{}:{}:{}",
        lat_r,
        lng_r,
        timestamp.date(),
        bucket,
        radius_m as i64
    )
}

impl<V: Clone> PredictionCache<V> {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Get a cached value, or None if absent or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock");
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        None
    }

    /// Insert a value, evicting the oldest insertion on overflow.
    pub fn put(&self, key: String, value: V) {
        let mut inner = self.inner.lock().expect("cache lock");

        while inner.entries.len() >= MAX_ENTRIES {
            let Some(oldest) = inner.insertion_order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.insertion_order.push_back(key);
        }
    }

    /// Clear the entire cache (signal update, crowd report).
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock().expect("cache lock");
        inner.entries.clear();
        inner.insertion_order.clear();
        tracing::info!("Prediction cache cleared");
    }

    /// Invalidate entries near a point. Cache keys carry no spatial
    /// structure, so this clears everything; per-region eviction is a
    /// documented future refinement.
    pub fn invalidate_area(&self, _lat: f64, _lng: f64, _radius_m: f64) {
        self.invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_key_shape() {
        let key = make_key(37.79461, -122.39992, ts(9, 17), 500.0);
        assert_eq!(key, "37.795:-122.4:2024-06-03:37:500");
    }

    #[test]
    fn test_key_same_bucket() {
        // 9:00 and 9:14 share a 15-minute bucket
        assert_eq!(
            make_key(37.79, -122.40, ts(9, 0), 500.0),
            make_key(37.79, -122.40, ts(9, 14), 500.0)
        );
        assert_ne!(
            make_key(37.79, -122.40, ts(9, 0), 500.0),
            make_key(37.79, -122.40, ts(9, 15), 500.0)
        );
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache: PredictionCache<String> = PredictionCache::new(60);
        cache.put("k".to_string(), "v".to_string());
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: PredictionCache<u32> = PredictionCache::new(0);
        cache.put("k".to_string(), 1);
        // TTL of zero expires immediately
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_invalidate_all() {
        let cache: PredictionCache<u32> = PredictionCache::new(60);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_invalidate_area_clears_everything() {
        let cache: PredictionCache<u32> = PredictionCache::new(60);
        cache.put("a".to_string(), 1);
        cache.invalidate_area(37.79, -122.40, 500.0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let cache: PredictionCache<usize> = PredictionCache::new(60);
        for i in 0..MAX_ENTRIES + 1 {
            cache.put(format!("k{}", i), i);
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
        // The first insertion was evicted
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get(&format!("k{}", MAX_ENTRIES)), Some(MAX_ENTRIES));
    }
}
