use crate::domain::ports::{KeyValueStore, load_or_default};
use crate::domain::run_record::{
    GLOBAL_HISTORY_KEY, RunRecord, append_capped, history_key, latest_output_key,
};
use crate::domain::scope::Scope;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Where run history is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRetention {
    /// One ring per agent.
    PerAgent,
    /// One ring shared by every agent.
    Global,
}

impl FromStr for HistoryRetention {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_agent" | "agent" => Ok(HistoryRetention::PerAgent),
            "global" => Ok(HistoryRetention::Global),
            _ => anyhow::bail!("Invalid HISTORY_RETENTION: {}. Must be 'per_agent' or 'global'", s),
        }
    }
}

/// Aggregates over an agent's retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunStats {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub success_rate: f64,
    pub avg_confidence: f64,
    pub avg_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Latest snapshot per (agent, scope) plus a capped, append-ordered history.
///
/// Writers for the same history ring are serialized so the read-append-prune
/// cycle never interleaves.
pub struct OutputRepository {
    store: Arc<dyn KeyValueStore>,
    history_limit: usize,
    retention: HistoryRetention,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OutputRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_retention(store, DEFAULT_HISTORY_LIMIT, HistoryRetention::PerAgent)
    }

    pub fn with_retention(
        store: Arc<dyn KeyValueStore>,
        history_limit: usize,
        retention: HistoryRetention,
    ) -> Self {
        Self {
            store,
            history_limit,
            retention,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Writes the latest snapshot and appends to history. I/O faults are
    /// logged and reported as `false`.
    pub async fn save_output(&self, record: &RunRecord) -> bool {
        match self.try_save(record).await {
            Ok(()) => {
                debug!(
                    "OutputRepository: Saved run {} for {} [{}]",
                    record.run_id, record.agent_key, record.scope
                );
                true
            }
            Err(e) => {
                error!(
                    "OutputRepository: Failed to save output for {} [{}]: {:#}",
                    record.agent_key, record.scope, e
                );
                false
            }
        }
    }

    async fn try_save(&self, record: &RunRecord) -> Result<()> {
        let ring_key = self.ring_key(&record.agent_key);
        let lock = self.lock_for(&ring_key).await;
        let _guard = lock.lock().await;

        // Every fallible read and encode happens before the first write
        let latest = serde_json::to_value(record).context("Failed to encode run record")?;
        let previous = self.store.load(&ring_key).await?;
        let mut history: Vec<RunRecord> = match &previous {
            Some(value) => {
                serde_json::from_value(value.clone()).context("Failed to decode run history")?
            }
            None => Vec::new(),
        };
        append_capped(&mut history, record.clone(), self.history_limit);
        let encoded_history =
            serde_json::to_value(&history).context("Failed to encode run history")?;

        self.store
            .save(&ring_key, encoded_history)
            .await
            .context("Failed to write run history")?;

        if let Err(e) = self
            .store
            .save(&latest_output_key(&record.agent_key, &record.scope), latest)
            .await
        {
            let rollback = match previous {
                Some(value) => self.store.save(&ring_key, value).await,
                None => self.store.delete(&ring_key).await.map(|_| ()),
            };
            if let Err(rollback_err) = rollback {
                error!(
                    "OutputRepository: Failed to roll back history {}: {:#}",
                    ring_key, rollback_err
                );
            }
            return Err(e.context("Failed to write latest snapshot"));
        }
        Ok(())
    }

    pub async fn load_latest(&self, agent_key: &str, scope: &Scope) -> Option<RunRecord> {
        load_or_default::<Option<RunRecord>>(
            self.store.as_ref(),
            &latest_output_key(agent_key, scope),
        )
        .await
    }

    /// Newest first, at most `limit` entries.
    pub async fn load_history(&self, agent_key: &str, limit: usize) -> Vec<RunRecord> {
        let history: Vec<RunRecord> =
            load_or_default(self.store.as_ref(), &self.ring_key(agent_key)).await;
        history
            .into_iter()
            .rev()
            .filter(|r| r.agent_key == agent_key)
            .take(limit)
            .collect()
    }

    /// Scope keys with a latest snapshot for `agent_key`.
    pub async fn list_scopes(&self, agent_key: &str) -> Vec<String> {
        let prefix = format!("agents/outputs/{}/latest/", agent_key);
        match self.store.list(&prefix).await {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                error!("OutputRepository: Failed to list scopes for {}: {:#}", agent_key, e);
                Vec::new()
            }
        }
    }

    pub async fn agent_stats(&self, agent_key: &str) -> AgentRunStats {
        let history = self.load_history(agent_key, usize::MAX).await;
        if history.is_empty() {
            return AgentRunStats::default();
        }

        let total = history.len();
        let successful: Vec<&RunRecord> = history.iter().filter(|r| r.success).collect();
        let confidences: Vec<f64> = successful
            .iter()
            .filter_map(|r| r.output.as_ref().map(|o| o.confidence))
            .collect();

        AgentRunStats {
            total_runs: total,
            successful_runs: successful.len(),
            success_rate: successful.len() as f64 / total as f64,
            avg_confidence: if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            },
            avg_duration_ms: history.iter().map(|r| r.duration_ms as f64).sum::<f64>()
                / total as f64,
            last_run_at: history.first().map(|r| r.finished_at),
        }
    }

    fn ring_key(&self, agent_key: &str) -> String {
        match self.retention {
            HistoryRetention::PerAgent => history_key(agent_key),
            HistoryRetention::Global => GLOBAL_HISTORY_KEY.to_string(),
        }
    }

    async fn lock_for(&self, ring_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(ring_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
