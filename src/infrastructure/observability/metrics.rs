//! Prometheus metrics definitions for GoAhead
//!
//! All metrics use the `goahead_` prefix and are read-only.

use prometheus::{
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};
use std::sync::Arc;

/// Prometheus metrics for the orchestration layer
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Agent runs by agent and outcome (success/failure)
    pub runs_total: CounterVec,
    /// Skipped dispatches by reason
    pub skips_total: CounterVec,
    /// Triggers emitted by type and severity
    pub triggers_total: CounterVec,
    /// Agent run duration in seconds
    pub run_duration_seconds: HistogramVec,
    /// Agent enabled state (0/1)
    pub agent_enabled: GenericGaugeVec<AtomicF64>,
    /// Runs currently executing
    pub in_flight_runs: GenericGauge<AtomicF64>,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("goahead_runs_total", "Agent runs by agent and outcome"),
            &["agent", "outcome"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let skips_total = CounterVec::new(
            Opts::new("goahead_skips_total", "Skipped agent dispatches by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(skips_total.clone()))?;

        let triggers_total = CounterVec::new(
            Opts::new("goahead_triggers_total", "KPI triggers by type and severity"),
            &["trigger_type", "severity"],
        )?;
        registry.register(Box::new(triggers_total.clone()))?;

        let run_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "goahead_run_duration_seconds",
                "Agent run duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["agent"],
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        let agent_enabled = GaugeVec::new(
            Opts::new("goahead_agent_enabled", "Agent enabled state (0/1)"),
            &["agent"],
        )?;
        registry.register(Box::new(agent_enabled.clone()))?;

        let in_flight_runs = Gauge::with_opts(Opts::new(
            "goahead_in_flight_runs",
            "Agent runs currently executing",
        ))?;
        registry.register(Box::new(in_flight_runs.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "goahead_uptime_seconds",
            "Service uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            runs_total,
            skips_total,
            triggers_total,
            run_duration_seconds,
            agent_enabled,
            in_flight_runs,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn observe_run(&self, agent: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.runs_total.with_label_values(&[agent, outcome]).inc();
        self.run_duration_seconds
            .with_label_values(&[agent])
            .observe(duration_secs);
    }

    pub fn inc_skip(&self, reason: &str) {
        self.skips_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_trigger(&self, trigger_type: &str, severity: &str) {
        self.triggers_total
            .with_label_values(&[trigger_type, severity])
            .inc();
    }

    pub fn set_agent_enabled(&self, agent: &str, enabled: bool) {
        self.agent_enabled
            .with_label_values(&[agent])
            .set(if enabled { 1.0 } else { 0.0 });
    }
}
