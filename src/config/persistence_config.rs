//! Persistence configuration parsing from environment variables.

use super::env;
use crate::infrastructure::persistence::HistoryRetention;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Key-value storage engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
    Json,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "json" | "file" => Ok(StoreBackend::Json),
            _ => anyhow::bail!(
                "Invalid STORE_BACKEND: {}. Must be 'memory', 'sqlite', or 'json'",
                s
            ),
        }
    }
}

/// Persistence environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceEnvConfig {
    pub backend: StoreBackend,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub history_limit: usize,
    pub retention: HistoryRetention,
    /// Persist rate-limit and cooldown state so it survives restarts.
    pub persist_guards: bool,
}

impl Default for PersistenceEnvConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_url: "sqlite://data/goahead.db".to_string(),
            data_dir: PathBuf::from("data/store"),
            history_limit: 1000,
            retention: HistoryRetention::PerAgent,
            persist_guards: true,
        }
    }
}

impl PersistenceEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let backend = StoreBackend::from_str(&env::string("STORE_BACKEND", "sqlite"))?;
        let retention = HistoryRetention::from_str(&env::string("HISTORY_RETENTION", "per_agent"))
            .context("Failed to parse HISTORY_RETENTION")?;

        Ok(Self {
            backend,
            database_url: env::string("DATABASE_URL", &defaults.database_url),
            data_dir: PathBuf::from(env::string("STORE_DIR", "data/store")),
            history_limit: env::parse("HISTORY_LIMIT", defaults.history_limit)?,
            retention,
            persist_guards: env::parse_bool("PERSIST_GUARDS", defaults.persist_guards),
        })
    }
}
