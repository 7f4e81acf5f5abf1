//! Retraining policy configuration.

use super::env;
use crate::domain::scope::Timeframe;
use anyhow::Result;

/// Trainer environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerEnvConfig {
    pub cooldown_days: u32,
    /// Relative hit-rate drop from the previous bundle that warrants a retrain.
    pub hit_rate_drop: f64,
    pub brier_short_term: f64,
    pub brier_medium_term: f64,
    pub brier_long_term: f64,
    /// Allowed gap between mean confidence and realized hit rate.
    pub confidence_drift: f64,
    pub max_days_without_retrain: i64,
    pub actions: Vec<String>,
}

impl Default for TrainerEnvConfig {
    fn default() -> Self {
        Self {
            cooldown_days: 3,
            hit_rate_drop: 0.10,
            brier_short_term: 0.18,
            brier_medium_term: 0.20,
            brier_long_term: 0.22,
            confidence_drift: 0.08,
            max_days_without_retrain: 14,
            actions: vec!["retrain_lstm".to_string(), "retrain_rf".to_string()],
        }
    }
}

impl TrainerEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            cooldown_days: env::parse("TRAINER_COOLDOWN_DAYS", defaults.cooldown_days)?,
            hit_rate_drop: env::parse("TRAINER_HIT_RATE_DROP", defaults.hit_rate_drop)?,
            brier_short_term: env::parse("TRAINER_BRIER_SHORT", defaults.brier_short_term)?,
            brier_medium_term: env::parse("TRAINER_BRIER_MEDIUM", defaults.brier_medium_term)?,
            brier_long_term: env::parse("TRAINER_BRIER_LONG", defaults.brier_long_term)?,
            confidence_drift: env::parse("TRAINER_CONFIDENCE_DRIFT", defaults.confidence_drift)?,
            max_days_without_retrain: env::parse(
                "TRAINER_MAX_DAYS_WITHOUT_RETRAIN",
                defaults.max_days_without_retrain,
            )?,
            actions: env::parse_list("TRAINER_ACTIONS", &defaults.actions.join(",")),
        })
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::days(self.cooldown_days as i64)
    }

    /// Brier ceiling for the horizon of `timeframe`.
    pub fn brier_threshold(&self, timeframe: Timeframe) -> f64 {
        match timeframe {
            Timeframe::ThreeDay | Timeframe::FiveDay => self.brier_short_term,
            Timeframe::ThirtyDay => self.brier_medium_term,
            _ => self.brier_long_term,
        }
    }
}
