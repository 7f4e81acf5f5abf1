use anyhow::{Context, Result};
use futures::FutureExt;
use std::sync::Arc;
use tracing::info;

use crate::application::bootstrap::{
    agents::AgentsBootstrap,
    persistence::{PersistenceBootstrap, PersistenceHandle},
    services::ServicesBootstrap,
};
use crate::application::orchestrator::{
    MetricsRecorder, Orchestrator, OrchestratorServices, TrainerPolicy,
};
use crate::config::Config;
use crate::domain::ports::{Scheduler, TimerCallback};
use crate::infrastructure::feature_flags::InMemoryFeatureFlags;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::scheduler::IntervalScheduler;
use crate::interfaces::api::AgentApi;

pub const KPI_REFRESH_JOB: &str = "kpi_refresh";

pub struct SystemHandle {
    pub orchestrator: Arc<Orchestrator>,
    pub api: Arc<AgentApi>,
    pub metrics: Metrics,
}

pub struct Application {
    pub config: Config,
    pub persistence: PersistenceHandle,
    pub feature_flags: Arc<InMemoryFeatureFlags>,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<IntervalScheduler>,
    pub metrics: Metrics,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(
            "Building GoAhead Application (store: {:?}, demo agents: {})...",
            config.persistence.backend, config.orchestrator.demo_agents
        );
        config
            .orchestrator
            .validate()
            .context("Invalid orchestrator configuration")?;

        let feature_flags = Arc::new(InMemoryFeatureFlags::from_spec(&config.feature_flags));
        let persistence = PersistenceBootstrap::init(&config.persistence).await?;
        let agents = AgentsBootstrap::init(&config, &feature_flags).await?;
        let services = ServicesBootstrap::init(&config, &persistence, &agents.registry).await?;

        let metrics = Metrics::new().context("Failed to register Prometheus metrics")?;
        for agent in agents.registry.list_agents().await {
            metrics.set_agent_enabled(&agent.descriptor.key, agent.descriptor.enabled);
        }

        let orchestrator = Arc::new(Orchestrator::new(
            config.orchestrator.clone(),
            OrchestratorServices {
                registry: agents.registry,
                runner: agents.runner,
                kpi: services.kpi,
                rate_limiter: services.rate_limiter,
                cooldowns: services.cooldowns,
                outputs: persistence.outputs.clone(),
                flags: feature_flags.clone(),
                store: persistence.store.clone(),
                trainer: TrainerPolicy::new(config.trainer.clone()),
                recorder: MetricsRecorder::with_prometheus(metrics.clone()),
            },
        ));

        Ok(Self {
            config,
            persistence,
            feature_flags,
            orchestrator,
            scheduler: Arc::new(IntervalScheduler::new()),
            metrics,
        })
    }

    /// Facade over the orchestrator for request-driven callers.
    pub fn api(&self) -> AgentApi {
        AgentApi::new(self.orchestrator.clone(), self.feature_flags.clone())
    }

    /// Starts the orchestrator and registers the periodic KPI refresh.
    pub async fn start(&self) -> Result<SystemHandle> {
        self.orchestrator.start().await;

        let orchestrator = self.orchestrator.clone();
        let callback: TimerCallback = Arc::new(move || {
            let orchestrator = orchestrator.clone();
            async move {
                orchestrator.on_timer_event().await;
            }
            .boxed()
        });
        self.scheduler
            .register(
                KPI_REFRESH_JOB,
                self.config.orchestrator.timer_interval(),
                callback,
                true,
            )
            .await
            .context("Failed to register KPI refresh job")?;

        info!(
            "GoAhead started: refresh every {}s over {} products x {} timeframes",
            self.config.orchestrator.timer_interval_secs,
            self.config.orchestrator.products.len(),
            self.config.orchestrator.timeframes.len()
        );

        Ok(SystemHandle {
            orchestrator: self.orchestrator.clone(),
            api: Arc::new(self.api()),
            metrics: self.metrics.clone(),
        })
    }

    /// Stops timers (letting a tick that is mid-run finish), then drains
    /// in-flight runs.
    pub async fn shutdown(&self) {
        info!("Initiating Graceful Shutdown Sequence...");
        self.scheduler.shutdown().await;
        self.orchestrator.stop().await;
        info!("Shutdown complete.");
    }
}
