//! KPI configuration parsing from environment variables.

use super::env;
use crate::domain::kpi::ThresholdTable;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

/// KPI environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct KpiEnvConfig {
    /// Bundles kept per scope for trend reporting.
    pub history_len: usize,
    /// TOML threshold overrides, merged over the built-in table.
    pub thresholds_file: Option<PathBuf>,
    pub warn_band: Option<f64>,
    pub min_samples: Option<usize>,
    /// Manual recomputes allowed per rate-limit window.
    pub recompute_limit: u32,
}

impl Default for KpiEnvConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            thresholds_file: None,
            warn_band: None,
            min_samples: None,
            recompute_limit: 3,
        }
    }
}

impl KpiEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            history_len: env::parse("KPI_HISTORY_LEN", defaults.history_len)?,
            thresholds_file: env::optional_string("KPI_THRESHOLDS_FILE").map(PathBuf::from),
            warn_band: env::parse_optional("KPI_WARN_BAND")?,
            min_samples: env::parse_optional("KPI_MIN_SAMPLES")?,
            recompute_limit: env::parse("KPI_RECOMPUTE_LIMIT", defaults.recompute_limit)?,
        })
    }

    /// Built-in thresholds, then the override file, then env overrides.
    pub fn load_thresholds(&self) -> Result<ThresholdTable> {
        let mut table = match &self.thresholds_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read thresholds file {:?}", path))?;
                info!("KpiEnvConfig: Loaded threshold overrides from {:?}", path);
                ThresholdTable::from_toml_str(&content)
                    .with_context(|| format!("Invalid thresholds file {:?}", path))?
            }
            None => ThresholdTable::default(),
        };
        if let Some(warn_band) = self.warn_band {
            if !(0.0..1.0).contains(&warn_band) {
                anyhow::bail!("KPI_WARN_BAND must be in [0, 1), got {}", warn_band);
            }
            table.warn_band = warn_band;
        }
        if let Some(min_samples) = self.min_samples {
            table.min_samples = min_samples;
        }
        Ok(table)
    }
}
