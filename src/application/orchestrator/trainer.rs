//! Retraining policy: decides whether a (product, timeframe) needs a retrain.

use crate::config::TrainerEnvConfig;
use crate::domain::agents::AgentOutput;
use crate::domain::kpi::KpiBundle;
use crate::domain::ports::{KeyValueStore, load_or_default, save_json};
use crate::domain::run_record::{TrainerDecision, append_capped};
use crate::domain::scope::{Scope, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TRAINER_AGENT_KEY: &str = "trainer";
pub const DECISIONS_KEY: &str = "trainer/decisions";
pub const DECISION_LOG_LEN: usize = 100;

/// A fired retrain condition and how much it is trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrainSignal {
    pub reason: String,
    pub confidence: f64,
}

/// Decision plus the trainer run it caused, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerOutcome {
    pub decision: TrainerDecision,
    pub output: Option<AgentOutput>,
}

/// Retrain history of one (product, timeframe) as seen by the cooldown guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerScopeStatus {
    pub product: String,
    pub timeframe: Timeframe,
    pub last_retrain: Option<DateTime<Utc>>,
    pub in_cooldown: bool,
    pub cooldown_remaining_secs: u64,
    pub next_eligible_at: Option<DateTime<Utc>>,
}

pub struct TrainerPolicy {
    config: TrainerEnvConfig,
}

impl TrainerPolicy {
    pub fn new(config: TrainerEnvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerEnvConfig {
        &self.config
    }

    pub fn cooldown(&self) -> chrono::Duration {
        self.config.cooldown()
    }

    /// Conditions are checked in order and the first that fires wins:
    /// hit-rate drop against the baseline, Brier ceiling for the horizon,
    /// confidence drift, then time since the last retrain.
    pub fn evaluate(
        &self,
        current: &KpiBundle,
        baseline: Option<&KpiBundle>,
        last_retrain: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<RetrainSignal> {
        let quality = &current.prediction_quality;

        if let Some(baseline) = baseline.filter(|b| !b.is_neutral()) {
            let base = baseline.prediction_quality.hit_rate;
            if base > 0.0 {
                let drop = (base - quality.hit_rate) / base;
                if drop > self.config.hit_rate_drop {
                    return Some(RetrainSignal {
                        reason: format!(
                            "Hit rate dropped {:.1}% (>{:.1}%) from baseline",
                            drop * 100.0,
                            self.config.hit_rate_drop * 100.0
                        ),
                        confidence: 0.9,
                    });
                }
            }
        }

        let brier_limit = self.config.brier_threshold(current.timeframe);
        if quality.brier_score > brier_limit {
            return Some(RetrainSignal {
                reason: format!(
                    "Brier score {:.3} exceeds threshold {:.3} for {}",
                    quality.brier_score, brier_limit, current.timeframe
                ),
                confidence: 0.85,
            });
        }

        if quality.avg_confidence > 0.0 {
            let drift = (quality.avg_confidence - quality.hit_rate).abs();
            if drift > self.config.confidence_drift {
                return Some(RetrainSignal {
                    reason: format!(
                        "Confidence drift {:.1}% exceeds threshold {:.1}%",
                        drift * 100.0,
                        self.config.confidence_drift * 100.0
                    ),
                    confidence: 0.8,
                });
            }
        }

        match last_retrain {
            None => Some(RetrainSignal {
                reason: format!(
                    "No previous retrain found for {} {}",
                    current.product, current.timeframe
                ),
                confidence: 0.6,
            }),
            Some(at) => {
                let days_since = (now - at).num_days();
                (days_since > self.config.max_days_without_retrain).then(|| RetrainSignal {
                    reason: format!(
                        "{} days since last retrain (max: {})",
                        days_since, self.config.max_days_without_retrain
                    ),
                    confidence: 0.7,
                })
            }
        }
    }

    pub fn decision(
        &self,
        scope: &Scope,
        triggered: bool,
        reason: impl Into<String>,
        confidence_score: f64,
        force_triggered: bool,
        now: DateTime<Utc>,
    ) -> TrainerDecision {
        TrainerDecision {
            triggered,
            reason: reason.into(),
            actions: if triggered {
                self.config.actions.clone()
            } else {
                Vec::new()
            },
            product: scope.product.clone(),
            timeframe: scope.timeframe.as_str().to_string(),
            timestamp: now,
            confidence_score,
            force_triggered,
        }
    }
}

/// Appends to the capped decision log. Failures are logged, not raised.
pub async fn log_decision(store: &dyn KeyValueStore, decision: &TrainerDecision) -> bool {
    let mut decisions: Vec<TrainerDecision> = load_or_default(store, DECISIONS_KEY).await;
    append_capped(&mut decisions, decision.clone(), DECISION_LOG_LEN);
    save_json(store, DECISIONS_KEY, &decisions).await
}

/// Most recent decisions first.
pub async fn recent_decisions(store: &dyn KeyValueStore, limit: usize) -> Vec<TrainerDecision> {
    let decisions: Vec<TrainerDecision> = load_or_default(store, DECISIONS_KEY).await;
    decisions.into_iter().rev().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::Timeframe;
    use chrono::Duration;

    fn bundle(timeframe: Timeframe, hit_rate: f64, brier: f64, confidence: f64) -> KpiBundle {
        let mut bundle = KpiBundle::neutral(timeframe, "equities", Utc::now());
        bundle.sample_size = 40;
        bundle.prediction_quality.hit_rate = hit_rate;
        bundle.prediction_quality.brier_score = brier;
        bundle.prediction_quality.avg_confidence = confidence;
        bundle
    }

    fn policy() -> TrainerPolicy {
        TrainerPolicy::new(TrainerEnvConfig::default())
    }

    #[test]
    fn test_hit_rate_drop_fires_first() {
        let now = Utc::now();
        let baseline = bundle(Timeframe::FiveDay, 0.75, 0.10, 0.7);
        let current = bundle(Timeframe::FiveDay, 0.60, 0.30, 0.9);

        let signal = policy()
            .evaluate(&current, Some(&baseline), Some(now), now)
            .unwrap();
        assert!(signal.reason.starts_with("Hit rate dropped"));
        assert!((signal.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_brier_threshold_depends_on_horizon() {
        let now = Utc::now();
        let recent = Some(now - Duration::days(1));

        // 0.19 breaches the short-term ceiling only
        let short = bundle(Timeframe::FiveDay, 0.7, 0.19, 0.7);
        let long = bundle(Timeframe::FifteenDay, 0.7, 0.19, 0.7);
        assert!(policy().evaluate(&short, None, recent, now).is_some());
        assert!(policy().evaluate(&long, None, recent, now).is_none());
    }

    #[test]
    fn test_confidence_drift_and_staleness() {
        let now = Utc::now();
        let drifting = bundle(Timeframe::TenDay, 0.60, 0.10, 0.75);
        let signal = policy()
            .evaluate(&drifting, None, Some(now), now)
            .unwrap();
        assert!(signal.reason.starts_with("Confidence drift"));

        let healthy = bundle(Timeframe::TenDay, 0.70, 0.10, 0.72);
        assert!(policy().evaluate(&healthy, None, Some(now), now).is_none());
        assert!(
            policy()
                .evaluate(&healthy, None, Some(now - Duration::days(15)), now)
                .is_some()
        );
        assert!(policy().evaluate(&healthy, None, None, now).is_some());
    }

    #[tokio::test]
    async fn test_decision_log_is_capped() {
        let store = crate::infrastructure::persistence::InMemoryKeyValueStore::new();
        let policy = policy();
        let scope = Scope::new("equities", Timeframe::FiveDay);
        for i in 0..(DECISION_LOG_LEN + 5) {
            let decision = policy.decision(&scope, false, format!("run {}", i), 0.0, false, Utc::now());
            assert!(log_decision(&store, &decision).await);
        }

        let recent = recent_decisions(&store, 500).await;
        assert_eq!(recent.len(), DECISION_LOG_LEN);
        assert_eq!(recent[0].reason, format!("run {}", DECISION_LOG_LEN + 4));
    }
}
