//! Push-based metrics reporter for GoAhead
//!
//! Periodically outputs orchestrator metrics as structured JSON to stdout.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::application::orchestrator::{Orchestrator, OrchestratorMetrics};
use crate::infrastructure::observability::metrics::Metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Metrics snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub in_flight: usize,
    pub orchestrator: OrchestratorMetrics,
    pub agents: Vec<AgentSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct AgentSnapshot {
    pub key: String,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success: Option<bool>,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    orchestrator: Arc<Orchestrator>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(orchestrator: Arc<Orchestrator>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            orchestrator,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// Run the reporter in a loop, outputting metrics periodically
    pub async fn run(self) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;

            let snapshot = self.collect_snapshot().await;
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    // Prefixed so log shippers can filter it
                    println!("METRICS_JSON:{}", json);
                    info!(
                        "Runs: {} ok / {} failed | Skipped: {} | In flight: {} | Uptime: {}s",
                        snapshot.orchestrator.successes,
                        snapshot.orchestrator.failures,
                        snapshot.orchestrator.runs_skipped,
                        snapshot.in_flight,
                        snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("MetricsReporter: Failed to serialize metrics: {}", e),
            }
        }
    }

    /// Current snapshot; also refreshes the gauges it covers.
    pub async fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let in_flight = self.orchestrator.in_flight();
        let orchestrator = self.orchestrator.get_metrics().await;

        let agents: Vec<AgentSnapshot> = self
            .orchestrator
            .registry()
            .list_agents()
            .await
            .into_iter()
            .map(|status| AgentSnapshot {
                key: status.descriptor.key,
                enabled: status.descriptor.enabled,
                last_run_at: status.last_run_at,
                last_success: status.last_success,
            })
            .collect();

        self.metrics.uptime_seconds.set(uptime as f64);
        self.metrics.in_flight_runs.set(in_flight as f64);
        for agent in &agents {
            self.metrics.set_agent_enabled(&agent.key, agent.enabled);
        }

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            in_flight,
            orchestrator,
            agents,
        }
    }
}
