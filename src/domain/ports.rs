//! Port interfaces for the collaborators the decision layer depends on.
//!
//! Implementations live in `infrastructure`; services receive them as
//! `Arc<dyn Trait>` at construction time.

use crate::domain::agents::{AgentInput, RawAgentOutput};
use crate::domain::kpi::PredictionRecord;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// External agent compute function. `AgentRunner` is the only caller.
#[async_trait]
pub trait AgentCompute: Send + Sync {
    async fn compute(&self, input: &AgentInput) -> Result<RawAgentOutput>;
}

/// Swappable key-value storage engine.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn save(&self, key: &str, value: Value) -> Result<()>;

    /// `Ok(None)` when the key does not exist.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.load(key).await?.is_some())
    }
}

/// Loads and decodes `key`, degrading to `T::default()` on a missing key,
/// an I/O fault or a decode failure.
pub async fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.load(key).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("KeyValueStore: Failed to decode '{}': {}", key, e);
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            warn!("KeyValueStore: Failed to load '{}': {:#}", key, e);
            T::default()
        }
    }
}

/// Encodes and saves `value`; returns false instead of failing.
pub async fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    let encoded = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            warn!("KeyValueStore: Failed to encode '{}': {}", key, e);
            return false;
        }
    };
    match store.save(key, encoded).await {
        Ok(()) => true,
        Err(e) => {
            warn!("KeyValueStore: Failed to save '{}': {:#}", key, e);
            false
        }
    }
}

/// Process-wide feature switches, read at every decision point.
pub trait FeatureFlags: Send + Sync {
    fn is_enabled(&self, flag: &str) -> bool;
}

pub mod flags {
    /// Master switch for every agent dispatch.
    pub const AGENTS_FRAMEWORK: &str = "enable_agents_framework";
    /// Timer-driven KPI refresh and trigger evaluation.
    pub const BACKGROUND_KPI_JOBS: &str = "enable_background_kpi_jobs";
    /// Trigger-driven dispatch after a KPI change.
    pub const GOAHEAD_TRIGGERS: &str = "enable_goahead_triggers";

    pub fn agent(key: &str) -> String {
        format!("enable_agent_{}", key)
    }
}

/// Source of prediction/outcome records for KPI computation.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn load_records(&self) -> Result<Vec<PredictionRecord>>;
}

pub type TimerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Interval scheduler. Registering an id that already exists with
/// `replace_existing` swaps the callback and interval.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn register(
        &self,
        id: &str,
        interval: Duration,
        callback: TimerCallback,
        replace_existing: bool,
    ) -> Result<()>;

    async fn cancel(&self, id: &str) -> bool;

    async fn job_ids(&self) -> Vec<String>;
}
