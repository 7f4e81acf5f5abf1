use crate::domain::kpi::PredictionRecord;
use crate::domain::ports::{KeyValueStore, PredictionSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory key-value store. Keys list in sorted order.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn save(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

/// Fixed set of prediction records, replaceable at runtime.
#[derive(Clone, Default)]
pub struct InMemoryPredictionSource {
    records: Arc<RwLock<Vec<PredictionRecord>>>,
}

impl InMemoryPredictionSource {
    pub fn new(records: Vec<PredictionRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub async fn set_records(&self, records: Vec<PredictionRecord>) {
        *self.records.write().await = records;
    }

    pub async fn push(&self, record: PredictionRecord) {
        self.records.write().await.push(record);
    }
}

#[async_trait]
impl PredictionSource for InMemoryPredictionSource {
    async fn load_records(&self) -> Result<Vec<PredictionRecord>> {
        Ok(self.records.read().await.clone())
    }
}

/// Reads records stored as a JSON array under one key of a `KeyValueStore`.
pub struct StorePredictionSource {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

pub const PREDICTIONS_HISTORY_KEY: &str = "predictions_history";

impl StorePredictionSource {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, PREDICTIONS_HISTORY_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl PredictionSource for StorePredictionSource {
    async fn load_records(&self) -> Result<Vec<PredictionRecord>> {
        match self.store.load(&self.key).await? {
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Failed to decode prediction records at '{}'", self.key)),
            None => Ok(Vec::new()),
        }
    }
}
