use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::agents::{AgentRegistry, AgentRunner};
use crate::config::Config;
use crate::domain::ports::flags;
use crate::domain::verdict::VerdictNormalizer;
use crate::infrastructure::feature_flags::InMemoryFeatureFlags;
use crate::infrastructure::mock::MockAgent;

pub struct AgentsHandle {
    pub registry: Arc<AgentRegistry>,
    pub runner: Arc<AgentRunner>,
}

pub struct AgentsBootstrap;

impl AgentsBootstrap {
    /// Loads descriptors, binds demo computes when asked, and defaults each
    /// agent's flag to on unless `FEATURE_FLAGS` already set it.
    pub async fn init(config: &Config, feature_flags: &InMemoryFeatureFlags) -> Result<AgentsHandle> {
        let agents = config.load_agents().context("Failed to load agent descriptors")?;
        if !agents.skipped.is_empty() {
            warn!("Skipped malformed agent entries: {:?}", agents.skipped);
        }

        let registry = Arc::new(AgentRegistry::new());
        registry.load(&agents).await;

        for descriptor in &agents.agents {
            feature_flags.set_default(&flags::agent(&descriptor.key), true);
            if config.orchestrator.demo_agents {
                registry
                    .bind(&descriptor.key, Arc::new(MockAgent::for_agent(&descriptor.key)))
                    .await
                    .with_context(|| format!("Failed to bind demo agent '{}'", descriptor.key))?;
            }
        }
        if config.orchestrator.demo_agents {
            info!("Bound demo computes for {} agents", agents.agents.len());
        }

        let runner = Arc::new(AgentRunner::with_timeout(
            registry.clone(),
            Arc::new(VerdictNormalizer::new()),
            config.orchestrator.agent_timeout(),
        ));

        Ok(AgentsHandle { registry, runner })
    }
}
