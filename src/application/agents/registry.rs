use crate::config::AgentsConfig;
use crate::domain::agents::{AgentDescriptor, AgentStatus};
use crate::domain::errors::AgentError;
use crate::domain::kpi::TriggerType;
use crate::domain::ports::AgentCompute;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

struct AgentEntry {
    descriptor: AgentDescriptor,
    compute: Option<Arc<dyn AgentCompute>>,
    last_run_at: Option<DateTime<Utc>>,
    last_success: Option<bool>,
}

/// Descriptor plus compute implementation, as handed to the runner.
#[derive(Clone)]
pub struct AgentBinding {
    pub descriptor: AgentDescriptor,
    pub compute: Option<Arc<dyn AgentCompute>>,
}

/// Known agents in registration order. Entries are never removed at runtime;
/// only their enabled flag changes.
pub struct AgentRegistry {
    entries: RwLock<Vec<AgentEntry>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Registers every descriptor of `config`. Returns the number added.
    pub async fn load(&self, config: &AgentsConfig) -> usize {
        let mut added = 0;
        for descriptor in &config.agents {
            if self.register(descriptor.clone(), None).await {
                added += 1;
            }
        }
        info!(
            "AgentRegistry: Loaded {} agents ({} skipped)",
            added,
            config.skipped.len()
        );
        added
    }

    /// Adds an agent, or rebinds the compute of a known one without touching
    /// its state. Returns true when the key was new.
    pub async fn register(
        &self,
        descriptor: AgentDescriptor,
        compute: Option<Arc<dyn AgentCompute>>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.descriptor.key == descriptor.key) {
            if compute.is_some() {
                entry.compute = compute;
            } else {
                warn!(
                    "AgentRegistry: Duplicate registration of '{}' ignored",
                    descriptor.key
                );
            }
            return false;
        }

        info!(
            "AgentRegistry: Registered '{}' (enabled={})",
            descriptor.key, descriptor.enabled
        );
        entries.push(AgentEntry {
            descriptor,
            compute,
            last_run_at: None,
            last_success: None,
        });
        true
    }

    /// Binds a compute implementation to an already-registered agent.
    pub async fn bind(&self, key: &str, compute: Arc<dyn AgentCompute>) -> Result<(), AgentError> {
        let mut entries = self.entries.write().await;
        let entry = find_mut(&mut entries, key)?;
        entry.compute = Some(compute);
        Ok(())
    }

    /// False for unknown keys.
    pub async fn is_agent_enabled(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .iter()
            .any(|e| e.descriptor.key == key && e.descriptor.enabled)
    }

    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries.iter().any(|e| e.descriptor.key == key)
    }

    pub async fn enable(&self, key: &str) -> Result<(), AgentError> {
        self.set_enabled(key, true).await.map(|_| ())
    }

    pub async fn disable(&self, key: &str) -> Result<(), AgentError> {
        self.set_enabled(key, false).await.map(|_| ())
    }

    /// Returns whether the state changed. Already in the target state is Ok.
    pub async fn set_enabled(&self, key: &str, enabled: bool) -> Result<bool, AgentError> {
        let mut entries = self.entries.write().await;
        let entry = find_mut(&mut entries, key)?;
        if entry.descriptor.enabled == enabled {
            return Ok(false);
        }
        entry.descriptor.enabled = enabled;
        info!(
            "AgentRegistry: Agent '{}' {}",
            key,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(true)
    }

    /// Enabled keys in registration order.
    pub async fn get_enabled_agents(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.descriptor.enabled)
            .map(|e| e.descriptor.key.clone())
            .collect()
    }

    pub async fn get(&self, key: &str) -> Option<AgentDescriptor> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|e| e.descriptor.key == key)
            .map(|e| e.descriptor.clone())
    }

    pub async fn binding(&self, key: &str) -> Option<AgentBinding> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|e| e.descriptor.key == key)
            .map(|e| AgentBinding {
                descriptor: e.descriptor.clone(),
                compute: e.compute.clone(),
            })
    }

    pub async fn list_agents(&self) -> Vec<AgentStatus> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|e| AgentStatus {
                descriptor: e.descriptor.clone(),
                has_compute: e.compute.is_some(),
                last_run_at: e.last_run_at,
                last_success: e.last_success,
            })
            .collect()
    }

    /// Candidate agents (enabled or not) answering `trigger` for `product`,
    /// in registration order.
    pub async fn agents_for_trigger(&self, trigger: TriggerType, product: &str) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.descriptor.answers(trigger) && e.descriptor.serves_product(product))
            .map(|e| e.descriptor.key.clone())
            .collect()
    }

    pub async fn record_run(&self, key: &str, success: bool, at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.descriptor.key == key) {
            entry.last_run_at = Some(at);
            entry.last_success = Some(success);
        }
    }
}

fn find_mut<'a>(entries: &'a mut [AgentEntry], key: &str) -> Result<&'a mut AgentEntry, AgentError> {
    entries
        .iter_mut()
        .find(|e| e.descriptor.key == key)
        .ok_or_else(|| AgentError::AgentNotFound {
            key: key.to_string(),
        })
}
