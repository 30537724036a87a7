use dashmap::DashMap;
use prometheus::Gauge;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::metrics::CACHE_SIZE;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CAPACITY: usize = 256;

// Cache entry with timestamp
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub data: Value,
    pub stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= ttl
    }
}

/// TTL cache for JSON response bodies.
///
/// Stale entries are evicted when read. The map is also bounded: once it
/// holds `capacity` keys, inserting a new key first purges anything older
/// than `default_ttl` and then, if still full, drops the oldest entry.
/// Every insert and removal republishes the entry count on `size_gauge`.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
    capacity: usize,
    size_gauge: Gauge,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            capacity: capacity.max(1),
            size_gauge: CACHE_SIZE.clone(),
        }
    }

    /// Report the entry count on `gauge` instead of the global cache gauge.
    pub fn with_size_gauge(mut self, gauge: Gauge) -> Self {
        gauge.set(self.entries.len() as f64);
        self.size_gauge = gauge;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        self.get_at(key, ttl, Instant::now())
    }

    pub fn get_at(&self, key: &str, ttl: Duration, now: Instant) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(ttl, now) {
                return Some(entry.data.clone());
            }
        }
        // stale or missing; the guard above is released before removing
        if self
            .entries
            .remove_if(key, |_, entry| !entry.is_fresh(ttl, now))
            .is_some()
        {
            self.record_size();
        }
        None
    }

    pub fn set(&self, key: &str, data: Value) {
        self.set_at(key, data, Instant::now());
    }

    pub fn set_at(&self, key: &str, data: Value, now: Instant) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.make_room(now);
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                stored_at: now,
            },
        );
        self.record_size();
    }

    pub fn clear(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.record_size();
        }
    }

    pub fn clear_all(&self) {
        self.entries.clear();
        self.record_size();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self, now: Instant) {
        let ttl = self.default_ttl;
        self.entries.retain(|_, entry| entry.is_fresh(ttl, now));
        if self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.stored_at)
            .map(|entry| entry.key().clone());
        if let Some(victim) = oldest {
            self.entries.remove(&victim);
        }
    }

    fn record_size(&self) {
        self.size_gauge.set(self.entries.len() as f64);
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_within_ttl() {
        let cache = ResponseCache::default();
        let now = Instant::now();
        cache.set_at("/api/projects", json!([1, 2]), now);

        let ttl = Duration::from_secs(10);
        assert_eq!(cache.get_at("/api/projects", ttl, now), Some(json!([1, 2])));
        assert_eq!(
            cache.get_at("/api/projects", ttl, now + Duration::from_secs(10)),
            Some(json!([1, 2]))
        );
    }

    #[test]
    fn test_stale_entry_is_evicted_on_read() {
        let cache = ResponseCache::default();
        let now = Instant::now();
        cache.set_at("k", json!("v"), now);

        let ttl = Duration::from_secs(1);
        assert_eq!(cache.get_at("k", ttl, now + Duration::from_secs(2)), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_at("k", ttl, now), None);
    }

    #[test]
    fn test_set_overwrites_and_refreshes() {
        let cache = ResponseCache::default();
        let now = Instant::now();
        cache.set_at("k", json!(1), now);
        cache.set_at("k", json!(2), now + Duration::from_secs(5));

        let ttl = Duration::from_secs(3);
        assert_eq!(
            cache.get_at("k", ttl, now + Duration::from_secs(7)),
            Some(json!(2))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::default();
        cache.set("a", json!(1));
        cache.set("b", json!(2));

        cache.clear("a");
        assert_eq!(cache.get("a", DEFAULT_TTL), None);
        assert_eq!(cache.get("b", DEFAULT_TTL), Some(json!(2)));

        cache.clear_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        let now = Instant::now();
        cache.set_at("first", json!(1), now);
        cache.set_at("second", json!(2), now + Duration::from_secs(1));
        cache.set_at("third", json!(3), now + Duration::from_secs(2));

        let ttl = Duration::from_secs(60);
        let at = now + Duration::from_secs(3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("first", ttl, at), None);
        assert_eq!(cache.get_at("second", ttl, at), Some(json!(2)));
        assert_eq!(cache.get_at("third", ttl, at), Some(json!(3)));
    }

    #[test]
    fn test_capacity_prefers_purging_stale() {
        let cache = ResponseCache::new(Duration::from_secs(5), 2);
        let now = Instant::now();
        cache.set_at("old", json!(1), now);
        cache.set_at("fresh", json!(2), now + Duration::from_secs(9));
        cache.set_at("new", json!(3), now + Duration::from_secs(10));

        let ttl = Duration::from_secs(5);
        let at = now + Duration::from_secs(10);
        assert_eq!(cache.get_at("fresh", ttl, at), Some(json!(2)));
        assert_eq!(cache.get_at("new", ttl, at), Some(json!(3)));
    }

    #[test]
    fn test_size_gauge_follows_removals() {
        let gauge = Gauge::new("test_cache_size", "entries").unwrap();
        let cache = ResponseCache::new(Duration::from_secs(60), 8).with_size_gauge(gauge.clone());
        let now = Instant::now();

        cache.set_at("a", json!(1), now);
        cache.set_at("b", json!(2), now);
        cache.set_at("c", json!(3), now);
        assert_eq!(gauge.get(), 3.0);

        // stale read evicts
        assert_eq!(cache.get_at("a", Duration::from_secs(1), now + Duration::from_secs(2)), None);
        assert_eq!(gauge.get(), 2.0);

        cache.clear("b");
        assert_eq!(gauge.get(), 1.0);

        cache.clear_all();
        assert_eq!(gauge.get(), 0.0);
    }
}
