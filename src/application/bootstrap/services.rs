use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::application::agents::AgentRegistry;
use crate::application::kpi::KpiService;
use crate::application::risk_management::{CooldownTracker, RateLimiter};
use crate::application::bootstrap::persistence::PersistenceHandle;
use crate::config::Config;

pub struct ServicesHandle {
    pub kpi: Arc<KpiService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cooldowns: Arc<CooldownTracker>,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub async fn init(
        config: &Config,
        persistence: &PersistenceHandle,
        registry: &AgentRegistry,
    ) -> Result<ServicesHandle> {
        let thresholds = config
            .kpi
            .load_thresholds()
            .context("Failed to load KPI thresholds")?;
        let kpi = Arc::new(
            KpiService::new(
                persistence.predictions.clone(),
                persistence.store.clone(),
                thresholds,
            )
            .with_history_len(config.kpi.history_len),
        );

        let mut rate_limiter = RateLimiter::with_window(
            config.orchestrator.rate_limit_per_window,
            config.orchestrator.rate_limit_window(),
        );
        let mut cooldowns = CooldownTracker::new();
        if config.persistence.persist_guards {
            rate_limiter = rate_limiter.with_store(persistence.store.clone());
            cooldowns = cooldowns.with_store(persistence.store.clone());
        }

        let restored_limits = rate_limiter.restore().await;
        let restored_cooldowns = cooldowns.restore().await;
        if restored_limits + restored_cooldowns > 0 {
            info!(
                "Restored {} rate-limit windows and {} cooldowns",
                restored_limits, restored_cooldowns
            );
        }

        // Limits apply on top of restored windows
        for agent in registry.list_agents().await {
            if let Some(limit) = agent.descriptor.rate_limit_per_window {
                rate_limiter.set_limit(&agent.descriptor.key, limit).await;
            }
        }
        rate_limiter
            .set_limit(crate::interfaces::api::RECOMPUTE_RATE_KEY, config.kpi.recompute_limit)
            .await;

        Ok(ServicesHandle {
            kpi,
            rate_limiter: Arc::new(rate_limiter),
            cooldowns: Arc::new(cooldowns),
        })
    }
}
