//! Configuration module for GoAhead.
//!
//! Structured configuration loaded from environment variables (after
//! `dotenvy` has read `.env`), organized by concern: Orchestrator, KPI,
//! Persistence, Trainer and Observability. Agent descriptors and threshold
//! overrides come from TOML files named by the environment.

mod agents_config;
mod env;
mod kpi_config;
mod observability_config;
mod orchestrator_config;
mod persistence_config;
mod trainer_config;

pub use agents_config::{AgentsConfig, DEFAULT_AGENT_KEYS};
pub use kpi_config::KpiEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use orchestrator_config::OrchestratorEnvConfig;
pub use persistence_config::{PersistenceEnvConfig, StoreBackend};
pub use trainer_config::TrainerEnvConfig;

use anyhow::{Context, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub orchestrator: OrchestratorEnvConfig,
    pub kpi: KpiEnvConfig,
    pub persistence: PersistenceEnvConfig,
    pub trainer: TrainerEnvConfig,
    pub observability: ObservabilityEnvConfig,
    /// `flag=bool` overrides applied over the default feature flags.
    pub feature_flags: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            orchestrator: OrchestratorEnvConfig::from_env()
                .context("Failed to load orchestrator config")?,
            kpi: KpiEnvConfig::from_env().context("Failed to load KPI config")?,
            persistence: PersistenceEnvConfig::from_env()
                .context("Failed to load persistence config")?,
            trainer: TrainerEnvConfig::from_env().context("Failed to load trainer config")?,
            observability: ObservabilityEnvConfig::from_env()
                .context("Failed to load observability config")?,
            feature_flags: std::env::var("FEATURE_FLAGS").unwrap_or_default(),
        })
    }

    /// Self-contained configuration: in-memory store, mock agents, no
    /// market-hours gate.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.persistence.backend = StoreBackend::Memory;
        config.persistence.persist_guards = false;
        config.orchestrator.market_hours_gate = false;
        config.orchestrator.demo_agents = true;
        config
    }

    /// Agent descriptors from `AGENTS_CONFIG_FILE`, or the built-in set.
    pub fn load_agents(&self) -> Result<AgentsConfig> {
        match &self.orchestrator.agents_file {
            Some(path) => AgentsConfig::from_file(path),
            None => Ok(AgentsConfig::defaults(self.trainer.cooldown_days)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::Timeframe;
    use crate::infrastructure::persistence::HistoryRetention;
    use std::sync::Mutex;

    // Environment is process-global; serialize tests that touch it
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: [&str; 7] = [
        "GOAHEAD_PRODUCTS",
        "GOAHEAD_TIMEFRAMES",
        "AGENT_RATE_LIMIT",
        "STORE_BACKEND",
        "HISTORY_RETENTION",
        "TRAINER_COOLDOWN_DAYS",
        "KPI_WARN_BAND",
    ];

    fn clear_env() {
        for key in KEYS {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let config = Config::from_env().expect("Should parse with defaults");
        assert_eq!(config.orchestrator.rate_limit_per_window, 6);
        assert_eq!(config.orchestrator.timer_interval_secs, 900);
        assert_eq!(config.orchestrator.timeframes.len(), 6);
        assert_eq!(config.persistence.backend, StoreBackend::Sqlite);
        assert_eq!(config.persistence.history_limit, 1000);
        assert_eq!(config.trainer.cooldown_days, 3);
        assert_eq!(config.kpi.history_len, 10);
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        unsafe {
            std::env::set_var("GOAHEAD_PRODUCTS", "Equities, options");
            std::env::set_var("GOAHEAD_TIMEFRAMES", "5d,All");
            std::env::set_var("AGENT_RATE_LIMIT", "2");
            std::env::set_var("STORE_BACKEND", "json");
            std::env::set_var("HISTORY_RETENTION", "global");
            std::env::set_var("TRAINER_COOLDOWN_DAYS", "5");
        }

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.orchestrator.products, vec!["equities", "options"]);
        assert_eq!(
            config.orchestrator.timeframes,
            vec![Timeframe::FiveDay, Timeframe::All]
        );
        assert_eq!(config.orchestrator.rate_limit_per_window, 2);
        assert_eq!(config.persistence.backend, StoreBackend::Json);
        assert_eq!(config.persistence.retention, HistoryRetention::Global);
        assert_eq!(config.load_agents().unwrap().agents[1].cooldown_secs, Some(5 * 86_400));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        unsafe { std::env::set_var("GOAHEAD_TIMEFRAMES", "7D") };
        assert!(Config::from_env().is_err());
        clear_env();

        unsafe { std::env::set_var("STORE_BACKEND", "postgres") };
        assert!(Config::from_env().is_err());
        clear_env();

        unsafe { std::env::set_var("KPI_WARN_BAND", "1.5") };
        let config = Config::from_env().unwrap();
        clear_env();
        assert!(config.kpi.load_thresholds().is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }
}
