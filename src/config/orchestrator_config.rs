//! Orchestrator configuration parsing from environment variables.
//!
//! Covers the product/timeframe grid the timer walks, guard defaults and the
//! agent registry source.

use super::env;
use crate::domain::scope::Timeframe;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Orchestrator environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorEnvConfig {
    /// Products evaluated on each timer tick; `all` is the unfiltered view.
    pub products: Vec<String>,
    pub timeframes: Vec<Timeframe>,

    // Guards
    /// Cooldown for agents whose descriptor sets none.
    pub default_cooldown_secs: u64,
    pub rate_limit_per_window: u32,
    pub rate_limit_window_secs: u64,

    // Execution
    pub agent_timeout_secs: u64,
    pub timer_interval_secs: u64,
    pub market_hours_gate: bool,

    // Registry
    pub agents_file: Option<PathBuf>,
    /// Bind deterministic mock computes to every registered agent.
    pub demo_agents: bool,
}

impl Default for OrchestratorEnvConfig {
    fn default() -> Self {
        Self {
            products: vec![
                "all".to_string(),
                "equities".to_string(),
                "options".to_string(),
                "comm".to_string(),
            ],
            timeframes: Timeframe::EVERY.to_vec(),
            default_cooldown_secs: 3600,
            rate_limit_per_window: 6,
            rate_limit_window_secs: 60,
            agent_timeout_secs: 10,
            timer_interval_secs: 15 * 60,
            market_hours_gate: true,
            agents_file: None,
            demo_agents: true,
        }
    }
}

impl OrchestratorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let products: Vec<String> = env::parse_list("GOAHEAD_PRODUCTS", &defaults.products.join(","))
            .into_iter()
            .map(|p| p.to_lowercase())
            .collect();

        let timeframes = env::parse_list("GOAHEAD_TIMEFRAMES", "3D,5D,10D,15D,30D,All")
            .iter()
            .map(|tf| tf.parse::<Timeframe>())
            .collect::<Result<Vec<_>>>()
            .context("Failed to parse GOAHEAD_TIMEFRAMES")?;

        let config = Self {
            products,
            timeframes,
            default_cooldown_secs: env::parse("AGENT_COOLDOWN_SECONDS", defaults.default_cooldown_secs)?,
            rate_limit_per_window: env::parse("AGENT_RATE_LIMIT", defaults.rate_limit_per_window)?,
            rate_limit_window_secs: env::parse(
                "AGENT_RATE_WINDOW_SECONDS",
                defaults.rate_limit_window_secs,
            )?,
            agent_timeout_secs: env::parse("AGENT_TIMEOUT_SECONDS", defaults.agent_timeout_secs)?,
            timer_interval_secs: env::parse(
                "KPI_REFRESH_INTERVAL_SECONDS",
                defaults.timer_interval_secs,
            )?,
            market_hours_gate: env::parse_bool("MARKET_HOURS_GATE", defaults.market_hours_gate),
            agents_file: env::optional_string("AGENTS_CONFIG_FILE").map(PathBuf::from),
            demo_agents: env::parse_bool("DEMO_AGENTS", defaults.demo_agents),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.products.is_empty() {
            anyhow::bail!("GOAHEAD_PRODUCTS must name at least one product");
        }
        if self.timeframes.is_empty() {
            anyhow::bail!("GOAHEAD_TIMEFRAMES must name at least one timeframe");
        }
        if self.rate_limit_window_secs == 0 || self.timer_interval_secs == 0 {
            anyhow::bail!("Rate-limit window and timer interval must be positive");
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.agent_timeout_secs.max(1))
    }

    pub fn rate_limit_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rate_limit_window_secs as i64)
    }

    pub fn timer_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timer_interval_secs)
    }
}
