use crate::domain::ports::{KeyValueStore, load_or_default, save_json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const STORE_KEY: &str = "guards/cooldowns";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    pub key: String,
    pub last_triggered_at: DateTime<Utc>,
    /// Always >= `last_triggered_at`.
    pub cooldown_until: DateTime<Utc>,
}

impl CooldownState {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.cooldown_until
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.cooldown_until - now).max(Duration::zero())
    }
}

/// Minimum spacing between triggered actions, keyed by (agent, scope).
pub struct CooldownTracker {
    states: Mutex<HashMap<String, CooldownState>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn start_cooldown(&self, key: &str, duration: Duration) -> CooldownState {
        self.start_cooldown_at(key, duration, Utc::now()).await
    }

    pub async fn start_cooldown_at(
        &self,
        key: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> CooldownState {
        let state = new_state(key, duration, now);
        let mut states = self.states.lock().await;
        states.insert(key.to_string(), state.clone());
        self.persist(&states).await;
        debug!(
            "CooldownTracker: '{}' cooling down until {}",
            key, state.cooldown_until
        );
        state
    }

    /// Unknown keys are never in cooldown.
    pub async fn is_in_cooldown(&self, key: &str) -> bool {
        self.is_in_cooldown_at(key, Utc::now()).await
    }

    pub async fn is_in_cooldown_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.states
            .lock()
            .await
            .get(key)
            .is_some_and(|s| s.is_active_at(now))
    }

    /// Atomic check-and-start. With `force` the check is skipped but the new
    /// window is still recorded. On rejection returns the blocking state.
    pub async fn try_begin_at(
        &self,
        key: &str,
        duration: Duration,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<CooldownState, CooldownState> {
        let mut states = self.states.lock().await;
        if !force
            && let Some(existing) = states.get(key)
            && existing.is_active_at(now)
        {
            return Err(existing.clone());
        }
        let state = new_state(key, duration, now);
        states.insert(key.to_string(), state.clone());
        self.persist(&states).await;
        Ok(state)
    }

    pub async fn get_state(&self, key: &str) -> Option<CooldownState> {
        self.states.lock().await.get(key).cloned()
    }

    pub async fn remaining_at(&self, key: &str, now: DateTime<Utc>) -> Duration {
        self.states
            .lock()
            .await
            .get(key)
            .map(|s| s.remaining_at(now))
            .unwrap_or_else(Duration::zero)
    }

    pub async fn snapshot(&self) -> Vec<CooldownState> {
        let mut states: Vec<_> = self.states.lock().await.values().cloned().collect();
        states.sort_by(|a, b| a.key.cmp(&b.key));
        states
    }

    /// Reloads persisted cooldowns after a restart.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let persisted: HashMap<String, CooldownState> =
            load_or_default(store.as_ref(), STORE_KEY).await;
        let count = persisted.len();
        *self.states.lock().await = persisted;
        if count > 0 {
            info!("CooldownTracker: Restored {} cooldowns", count);
        }
        count
    }

    /// Called with the state lock held so stored snapshots follow write order.
    async fn persist(&self, states: &HashMap<String, CooldownState>) {
        if let Some(store) = &self.store {
            save_json(store.as_ref(), STORE_KEY, states).await;
        }
    }
}

fn new_state(key: &str, duration: Duration, now: DateTime<Utc>) -> CooldownState {
    CooldownState {
        key: key.to_string(),
        last_triggered_at: now,
        cooldown_until: now + duration.max(Duration::zero()),
    }
}
