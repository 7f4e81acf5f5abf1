use crate::domain::ports::{KeyValueStore, load_or_default, save_json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Requests per window for keys without an explicit limit.
pub const DEFAULT_LIMIT: u32 = 6;

const STORE_KEY: &str = "guards/rate_limits";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub key: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub limit: u32,
}

/// Fixed-window counter per key.
///
/// Check and increment happen under one lock, so concurrent callers can never
/// be admitted beyond the limit.
pub struct RateLimiter {
    states: Mutex<HashMap<String, RateLimitState>>,
    limits: Mutex<HashMap<String, u32>>,
    default_limit: u32,
    window: Duration,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl RateLimiter {
    pub fn new(default_limit: u32) -> Self {
        Self::with_window(default_limit, Duration::minutes(1))
    }

    pub fn with_window(default_limit: u32, window: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
            default_limit,
            window,
            store: None,
        }
    }

    /// Persists window state so limits survive a restart.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn set_limit(&self, key: &str, limit: u32) {
        self.limits.lock().await.insert(key.to_string(), limit);
        if let Some(state) = self.states.lock().await.get_mut(key) {
            state.limit = limit;
        }
        debug!("RateLimiter: Limit for '{}' set to {}/window", key, limit);
    }

    /// Explicit limit for `key`, else the limit of its family (the part
    /// before the first `:`), else the default.
    pub async fn limit_for(&self, key: &str) -> u32 {
        let limits = self.limits.lock().await;
        limits
            .get(key)
            .or_else(|| {
                key.split_once(':')
                    .and_then(|(family, _)| limits.get(family))
            })
            .copied()
            .unwrap_or(self.default_limit)
    }

    pub async fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Utc::now()).await
    }

    /// Consumes one slot if available in the window containing `now`.
    pub async fn is_allowed_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let limit = self.limit_for(key).await;

        let mut states = self.states.lock().await;
        let state = states.entry(key.to_string()).or_insert_with(|| RateLimitState {
            key: key.to_string(),
            window_start: now,
            count: 0,
            limit,
        });
        state.limit = limit;

        if now >= state.window_start + self.window || now < state.window_start {
            state.window_start = now;
            state.count = 0;
        }

        let allowed = state.count < state.limit;
        if allowed {
            state.count += 1;
        } else {
            warn!("RateLimiter: '{}' exceeded {} requests/window", key, limit);
        }
        self.persist(&states).await;
        allowed
    }

    /// Gives back a slot taken at `now` whose work never started.
    pub async fn release_at(&self, key: &str, now: DateTime<Utc>) {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(key) else {
            return;
        };
        if now >= state.window_start && now < state.window_start + self.window && state.count > 0 {
            state.count -= 1;
            debug!("RateLimiter: Released a slot of '{}' ({} used)", key, state.count);
            self.persist(&states).await;
        }
    }

    /// When the current window of `key` closes, if one is open.
    pub async fn reset_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.states
            .lock()
            .await
            .get(key)
            .map(|s| s.window_start + self.window)
    }

    /// Seconds until the window of `key` closes, relative to `now`.
    pub async fn retry_after_secs(&self, key: &str, now: DateTime<Utc>) -> u64 {
        self.reset_at(key)
            .await
            .map(|at| (at - now).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub async fn get_state(&self, key: &str) -> Option<RateLimitState> {
        self.states.lock().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> Vec<RateLimitState> {
        let mut states: Vec<_> = self.states.lock().await.values().cloned().collect();
        states.sort_by(|a, b| a.key.cmp(&b.key));
        states
    }

    /// Restores persisted windows. Missing or unreadable state starts empty.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let persisted: HashMap<String, RateLimitState> =
            load_or_default(store.as_ref(), STORE_KEY).await;
        let count = persisted.len();
        *self.states.lock().await = persisted;
        if count > 0 {
            info!("RateLimiter: Restored {} rate-limit windows", count);
        }
        count
    }

    /// Called with the state lock held so stored snapshots follow write order.
    async fn persist(&self, states: &HashMap<String, RateLimitState>) {
        if let Some(store) = &self.store {
            save_json(store.as_ref(), STORE_KEY, states).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_exactly_limit_per_window() {
        let limiter = RateLimiter::with_window(3, Duration::seconds(60));
        let t0 = Utc::now();

        for _ in 0..3 {
            assert!(limiter.is_allowed_at("equity", t0).await);
        }
        assert!(!limiter.is_allowed_at("equity", t0 + Duration::seconds(10)).await);
        assert!(!limiter.is_allowed_at("equity", t0 + Duration::seconds(59)).await);

        // Window rollover
        assert!(limiter.is_allowed_at("equity", t0 + Duration::seconds(60)).await);
        let state = limiter.get_state("equity").await.unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.window_start, t0 + Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::with_window(1, Duration::seconds(60));
        let t0 = Utc::now();
        assert!(limiter.is_allowed_at("a", t0).await);
        assert!(!limiter.is_allowed_at("a", t0).await);
        assert!(limiter.is_allowed_at("b", t0).await);
    }

    #[tokio::test]
    async fn test_set_limit_overrides_default() {
        let limiter = RateLimiter::with_window(1, Duration::seconds(60));
        limiter.set_limit("kpi_recompute", 2).await;
        let t0 = Utc::now();
        assert!(limiter.is_allowed_at("kpi_recompute", t0).await);
        assert!(limiter.is_allowed_at("kpi_recompute", t0).await);
        assert!(!limiter.is_allowed_at("kpi_recompute", t0).await);
        assert_eq!(
            limiter.retry_after_secs("kpi_recompute", t0).await,
            60
        );
    }

    #[tokio::test]
    async fn test_zero_limit_blocks_everything() {
        let limiter = RateLimiter::with_window(0, Duration::seconds(60));
        assert!(!limiter.is_allowed("any").await);
    }

    #[tokio::test]
    async fn test_family_limit_applies_per_scoped_key() {
        let limiter = RateLimiter::with_window(6, Duration::seconds(60));
        limiter.set_limit("kpi_recompute", 1).await;
        let t0 = Utc::now();

        assert_eq!(limiter.limit_for("kpi_recompute:product:5D:options").await, 1);
        assert!(limiter.is_allowed_at("kpi_recompute:product:5D:options", t0).await);
        assert!(!limiter.is_allowed_at("kpi_recompute:product:5D:options", t0).await);
        assert!(limiter.is_allowed_at("kpi_recompute:product:30D:equities", t0).await);
        assert_eq!(limiter.limit_for("equity").await, 6);
    }

    #[tokio::test]
    async fn test_release_returns_slot_within_window() {
        let limiter = RateLimiter::with_window(1, Duration::seconds(60));
        let t0 = Utc::now();
        assert!(limiter.is_allowed_at("equity", t0).await);
        limiter.release_at("equity", t0).await;
        assert_eq!(limiter.get_state("equity").await.unwrap().count, 0);
        assert!(limiter.is_allowed_at("equity", t0).await);

        // Nothing to give back once the window has rolled over
        limiter.release_at("equity", t0 + Duration::seconds(90)).await;
        assert_eq!(limiter.get_state("equity").await.unwrap().count, 1);
    }
}
