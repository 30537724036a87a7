//! Fixed-window rate limiting keyed by `"{client_ip}:{route}"`.
//!
//! Each key owns one counter and one expiry timestamp. Counters live in
//! process memory only, so every running instance enforces its own limit.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

use crate::error::LimiterError;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Window length and quota for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
        }
    }

    /// 3 submissions per 15 minutes.
    pub fn contact() -> Self {
        Self::new(Duration::from_secs(15 * 60), 3)
    }

    /// 10 messages per minute.
    pub fn chat() -> Self {
        Self::new(Duration::from_secs(60), 10)
    }
}

// Rate limit entry - tracks requests per key inside the current window
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl RateLimitEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_reset_at
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Time left until the current window closes, zero if it already has.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.reset - now).to_std().unwrap_or(Duration::ZERO)
    }
}

pub struct RateLimiter {
    store: DashMap<String, RateLimitEntry>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl RateLimiter {
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            store: DashMap::new(),
            sweep_interval,
            sweeper: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn limit(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, LimiterError> {
        self.limit_at(identifier, config, Utc::now())
    }

    /// Count one request for `identifier` as of `now`.
    pub fn limit_at(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, LimiterError> {
        if self.is_destroyed() {
            return Err(LimiterError::Destroyed);
        }

        let decision = {
            let mut entry = self
                .store
                .entry(identifier.to_string())
                .or_insert_with(|| new_window(now, config.window));

            // window expired..? start a fresh one
            if entry.is_expired(now) {
                *entry = new_window(now, config.window);
            }

            entry.count = entry.count.saturating_add(1);

            RateLimitDecision {
                success: entry.count <= config.max_requests,
                limit: config.max_requests,
                remaining: config.max_requests.saturating_sub(entry.count),
                reset: entry.window_reset_at,
            }
        };

        // shutdown may have cleared the store while we were counting
        if self.is_destroyed() {
            self.store.remove(identifier);
            return Err(LimiterError::Destroyed);
        }
        Ok(decision)
    }

    /// Drop every entry whose window has closed. Returns how many went.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.store.len())
    }

    /// Start the periodic sweep. The task only holds a weak reference,
    /// so dropping the last `Arc` also ends it.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                let removed = limiter.sweep_at(Utc::now());
                if removed > 0 {
                    debug!(removed, remaining = limiter.len(), "rate limiter sweep");
                }
            }
        });

        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the sweeper and forget all counters. Only the first call does anything.
    pub fn shutdown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.store.clear();
        info!("rate limiter shut down");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

fn new_window(now: DateTime<Utc>, window: Duration) -> RateLimitEntry {
    let span = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    RateLimitEntry {
        count: 0,
        window_reset_at: now
            .checked_add_signed(span)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig::new(Duration::from_millis(60_000), 3)
    }

    #[test]
    fn test_fixed_window_admits_first_n() {
        let limiter = RateLimiter::default();
        let now = Utc::now();

        let results: Vec<_> = (0..4)
            .map(|_| limiter.limit_at("1.2.3.4:/api/contact", &config(), now).unwrap())
            .collect();

        let success: Vec<bool> = results.iter().map(|d| d.success).collect();
        let remaining: Vec<u32> = results.iter().map(|d| d.remaining).collect();
        assert_eq!(success, vec![true, true, true, false]);
        assert_eq!(remaining, vec![2, 1, 0, 0]);
        assert!(results.iter().all(|d| d.limit == 3));
        assert_eq!(results[0].reset, now + TimeDelta::milliseconds(60_000));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::default();
        let start = Utc::now();
        for _ in 0..5 {
            limiter.limit_at("k", &config(), start).unwrap();
        }

        let later = start + TimeDelta::milliseconds(60_001);
        let decision = limiter.limit_at("k", &config(), later).unwrap();
        assert!(decision.success);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset, later + TimeDelta::milliseconds(60_000));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::default();
        let now = Utc::now();
        for _ in 0..3 {
            limiter.limit_at("a", &config(), now).unwrap();
        }
        assert!(!limiter.limit_at("a", &config(), now).unwrap().success);
        assert!(limiter.limit_at("b", &config(), now).unwrap().success);
    }

    #[test]
    fn test_sweep_removes_elapsed_entries() {
        let limiter = RateLimiter::default();
        let now = Utc::now();
        limiter.limit_at("a", &config(), now).unwrap();
        limiter.limit_at("b", &config(), now).unwrap();
        limiter
            .limit_at("c", &RateLimitConfig::new(Duration::from_secs(600), 3), now)
            .unwrap();

        let removed = limiter.sweep_at(now + TimeDelta::seconds(61));
        assert_eq!(removed, 2);
        assert_eq!(limiter.len(), 1);

        limiter.sweep_at(now + TimeDelta::seconds(601));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_retry_after() {
        let limiter = RateLimiter::default();
        let now = Utc::now();
        let decision = limiter.limit_at("k", &config(), now).unwrap();
        assert_eq!(decision.retry_after(now), Duration::from_secs(60));
        assert_eq!(
            decision.retry_after(now + TimeDelta::seconds(120)),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(10)));
        limiter.spawn_sweeper();
        limiter.limit("k", &config()).unwrap();

        limiter.shutdown();
        assert!(limiter.is_empty());
        assert!(limiter.is_destroyed());

        limiter.shutdown();
        assert_eq!(limiter.limit("k", &config()), Err(LimiterError::Destroyed));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_shutdown_during_concurrent_limits_leaves_store_empty() {
        for _ in 0..20 {
            let limiter = RateLimiter::default();
            std::thread::scope(|s| {
                for t in 0..4 {
                    let limiter = &limiter;
                    s.spawn(move || {
                        for i in 0..500 {
                            let key = format!("10.0.0.{t}:/api/chat:{i}");
                            if limiter.limit(&key, &config()).is_err() {
                                break;
                            }
                        }
                    });
                }
                s.spawn(|| limiter.shutdown());
            });
            assert!(limiter.is_destroyed());
            assert!(limiter.is_empty());
        }
    }

    #[tokio::test]
    async fn test_background_sweeper_empties_store() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(20)));
        limiter.spawn_sweeper();
        let short = RateLimitConfig::new(Duration::from_millis(5), 3);
        limiter.limit("k", &short).unwrap();
        assert_eq!(limiter.len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.is_empty());
        limiter.shutdown();
    }
}
