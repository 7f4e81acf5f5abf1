use crate::domain::kpi::Trigger;
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Why a candidate dispatch did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotRunning,
    FrameworkDisabled,
    AgentFlagDisabled,
    AgentNotFound,
    AgentDisabled,
    CooldownActive,
    RateLimited,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotRunning => "not_running",
            SkipReason::FrameworkDisabled => "framework_disabled",
            SkipReason::AgentFlagDisabled => "agent_flag_disabled",
            SkipReason::AgentNotFound => "agent_not_found",
            SkipReason::AgentDisabled => "agent_disabled",
            SkipReason::CooldownActive => "cooldown_active",
            SkipReason::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative orchestrator counters since the last `start()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub runs_dispatched: u64,
    pub runs_skipped: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_duration_ms: f64,
    pub triggers_evaluated: u64,
    pub skip_reasons: BTreeMap<String, u64>,
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub agent_last_activity: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Default)]
struct Counters {
    metrics: OrchestratorMetrics,
    total_duration_ms: u64,
}

/// Records orchestrator activity and mirrors it into Prometheus when wired.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: Mutex<Counters>,
    prometheus: Option<Metrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prometheus(metrics: Metrics) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            prometheus: Some(metrics),
        }
    }

    pub fn prometheus(&self) -> Option<&Metrics> {
        self.prometheus.as_ref()
    }

    /// Clears all counters.
    pub async fn reset(&self, started_at: DateTime<Utc>) {
        let mut counters = self.counters.lock().await;
        *counters = Counters::default();
        counters.metrics.started_at = Some(started_at);
    }

    pub async fn record_run(&self, agent: &str, success: bool, duration_ms: u64, at: DateTime<Utc>) {
        {
            let mut guard = self.counters.lock().await;
            let counters = &mut *guard;
            counters.total_duration_ms += duration_ms;
            let m = &mut counters.metrics;
            m.runs_dispatched += 1;
            if success {
                m.successes += 1;
            } else {
                m.failures += 1;
            }
            m.last_activity = Some(at);
            m.agent_last_activity.insert(agent.to_string(), at);
            m.avg_duration_ms = counters.total_duration_ms as f64 / m.runs_dispatched as f64;
        }
        if let Some(prometheus) = &self.prometheus {
            prometheus.observe_run(agent, success, duration_ms as f64 / 1000.0);
        }
    }

    pub async fn record_skip(&self, reason: SkipReason) {
        {
            let mut counters = self.counters.lock().await;
            counters.metrics.runs_skipped += 1;
            *counters
                .metrics
                .skip_reasons
                .entry(reason.as_str().to_string())
                .or_insert(0) += 1;
        }
        if let Some(prometheus) = &self.prometheus {
            prometheus.inc_skip(reason.as_str());
        }
    }

    pub async fn record_triggers(&self, triggers: &[Trigger]) {
        self.counters.lock().await.metrics.triggers_evaluated += triggers.len() as u64;
        if let Some(prometheus) = &self.prometheus {
            for trigger in triggers {
                prometheus.inc_trigger(trigger.trigger_type.as_str(), &trigger.severity.to_string());
            }
        }
    }

    pub async fn snapshot(&self, is_running: bool) -> OrchestratorMetrics {
        let mut metrics = self.counters.lock().await.metrics.clone();
        metrics.is_running = is_running;
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_average_duration_and_skip_breakdown() {
        let recorder = MetricsRecorder::new();
        let now = Utc::now();
        recorder.record_run("equity", true, 100, now).await;
        recorder.record_run("options", false, 300, now).await;
        recorder.record_skip(SkipReason::CooldownActive).await;
        recorder.record_skip(SkipReason::CooldownActive).await;
        recorder.record_skip(SkipReason::RateLimited).await;

        let snapshot = recorder.snapshot(true).await;
        assert_eq!(snapshot.runs_dispatched, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert!((snapshot.avg_duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(snapshot.runs_skipped, 3);
        assert_eq!(snapshot.skip_reasons["cooldown_active"], 2);
        assert_eq!(snapshot.skip_reasons["rate_limited"], 1);
        assert!(snapshot.agent_last_activity.contains_key("options"));
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let recorder = MetricsRecorder::new();
        recorder.record_skip(SkipReason::FrameworkDisabled).await;
        let started = Utc::now();
        recorder.reset(started).await;

        let snapshot = recorder.snapshot(false).await;
        assert_eq!(snapshot.runs_skipped, 0);
        assert!(snapshot.skip_reasons.is_empty());
        assert_eq!(snapshot.started_at, Some(started));
    }
}
