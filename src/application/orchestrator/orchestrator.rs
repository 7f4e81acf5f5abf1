use crate::application::agents::{AgentRegistry, AgentRunner};
use crate::application::kpi::KpiService;
use crate::application::orchestrator::market_hours;
use crate::application::orchestrator::metrics::{MetricsRecorder, OrchestratorMetrics, SkipReason};
use crate::application::orchestrator::trainer::{
    TRAINER_AGENT_KEY, TrainerOutcome, TrainerPolicy, TrainerScopeStatus, log_decision,
};
use crate::application::risk_management::{CooldownTracker, RateLimiter};
use crate::config::OrchestratorEnvConfig;
use crate::domain::agents::{AgentDescriptor, AgentInput, AgentOutput};
use crate::domain::errors::AgentError;
use crate::domain::kpi::Trigger;
use crate::domain::ports::{FeatureFlags, KeyValueStore, flags};
use crate::domain::run_record::RunRecord;
use crate::domain::scope::{Scope, Timeframe};
use crate::domain::verdict::CanonicalVerdict;
use crate::infrastructure::persistence::OutputRepository;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Stopped,
    Running,
    Stopping,
}

/// Context of a KPI change worth re-evaluating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiChangeEvent {
    pub products: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    /// Size of the change as reported by the caller; carried into agent input.
    pub magnitude: f64,
    /// Bypass cooldowns. Rate limits still apply.
    pub force: bool,
    pub reason: String,
}

impl KpiChangeEvent {
    pub fn new(products: &[&str], timeframes: &[Timeframe]) -> Self {
        Self {
            products: products.iter().map(|p| p.to_lowercase()).collect(),
            timeframes: timeframes.to_vec(),
            magnitude: 0.0,
            force: false,
            reason: "kpi_change".to_string(),
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = magnitude;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub run_id: Uuid,
    pub agent_key: String,
    pub scope: Scope,
    pub success: bool,
    pub verdict: CanonicalVerdict,
    pub duration_ms: u64,
    /// Whether the run record reached storage.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDispatch {
    pub agent_key: String,
    pub scope: Scope,
    pub reason: SkipReason,
}

/// What one event evaluated, ran and skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub triggers: Vec<Trigger>,
    pub dispatched: Vec<DispatchOutcome>,
    pub skipped: Vec<SkippedDispatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerOutcome {
    FlagDisabled,
    OutsideMarketHours,
    Ran(DispatchReport),
}

/// A guard said no.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardRejection {
    pub reason: SkipReason,
    pub error: AgentError,
}

/// Collaborators the orchestrator drives. Built once by the application.
pub struct OrchestratorServices {
    pub registry: Arc<AgentRegistry>,
    pub runner: Arc<AgentRunner>,
    pub kpi: Arc<KpiService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cooldowns: Arc<CooldownTracker>,
    pub outputs: Arc<OutputRepository>,
    pub flags: Arc<dyn FeatureFlags>,
    pub store: Arc<dyn KeyValueStore>,
    pub trainer: TrainerPolicy,
    pub recorder: MetricsRecorder,
}

struct Candidate {
    agent_key: String,
    scope: Scope,
    triggers: Vec<Trigger>,
}

/// Releases an in-flight slot and wakes `stop()` when the last one ends.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
    drained: &'a Notify,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Turns KPI changes and timer ticks into guarded agent runs.
///
/// Every dispatch passes the same pipeline: running state, framework flag,
/// registry state, per-agent flag, cooldown (unless forced), rate limit,
/// atomic cooldown claim, run, persist.
pub struct Orchestrator {
    config: OrchestratorEnvConfig,
    registry: Arc<AgentRegistry>,
    runner: Arc<AgentRunner>,
    kpi: Arc<KpiService>,
    rate_limiter: Arc<RateLimiter>,
    cooldowns: Arc<CooldownTracker>,
    outputs: Arc<OutputRepository>,
    flags: Arc<dyn FeatureFlags>,
    store: Arc<dyn KeyValueStore>,
    trainer: TrainerPolicy,
    recorder: MetricsRecorder,
    state: RwLock<OrchestratorState>,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Orchestrator {
    pub fn new(config: OrchestratorEnvConfig, services: OrchestratorServices) -> Self {
        Self {
            config,
            registry: services.registry,
            runner: services.runner,
            kpi: services.kpi,
            rate_limiter: services.rate_limiter,
            cooldowns: services.cooldowns,
            outputs: services.outputs,
            flags: services.flags,
            store: services.store,
            trainer: services.trainer,
            recorder: services.recorder,
            state: RwLock::new(OrchestratorState::Stopped),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorEnvConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn kpi(&self) -> &Arc<KpiService> {
        &self.kpi
    }

    pub fn outputs(&self) -> &Arc<OutputRepository> {
        &self.outputs
    }

    pub fn flags(&self) -> &Arc<dyn FeatureFlags> {
        &self.flags
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn prometheus(&self) -> Option<&crate::infrastructure::observability::Metrics> {
        self.recorder.prometheus()
    }

    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == OrchestratorState::Running
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resets metrics and begins accepting dispatches. Idempotent.
    pub async fn start(&self) {
        let mut state = self.state.write().await;
        if *state == OrchestratorState::Running {
            return;
        }
        self.recorder.reset(Utc::now()).await;
        *state = OrchestratorState::Running;
        info!("Orchestrator: Started");
    }

    /// Stops admitting dispatches and waits for in-flight ones to finish.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Running {
                return;
            }
            *state = OrchestratorState::Stopping;
        }
        info!(
            "Orchestrator: Stopping, draining {} in-flight runs",
            self.in_flight()
        );

        loop {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        *self.state.write().await = OrchestratorState::Stopped;
        info!("Orchestrator: Stopped");
    }

    pub async fn get_metrics(&self) -> OrchestratorMetrics {
        let running = self.is_running().await;
        self.recorder.snapshot(running).await
    }

    pub async fn on_kpi_change(&self, event: KpiChangeEvent) -> DispatchReport {
        self.on_kpi_change_at(event, Utc::now()).await
    }

    /// Computes and evaluates every (product, timeframe) of `event`, then
    /// dispatches each mapped agent at most once per scope.
    pub async fn on_kpi_change_at(&self, event: KpiChangeEvent, now: DateTime<Utc>) -> DispatchReport {
        if !self.is_running().await {
            warn!("Orchestrator: Ignoring KPI change while not running");
            return DispatchReport::default();
        }

        let mut report = DispatchReport::default();
        for timeframe in &event.timeframes {
            for product in &event.products {
                let bundle = self.kpi.compute_at(*timeframe, product, now).await;
                if !self.flags.is_enabled(flags::GOAHEAD_TRIGGERS) {
                    debug!("Orchestrator: Trigger evaluation disabled by flag");
                    continue;
                }
                report.triggers.extend(self.kpi.evaluate_triggers(&bundle));
            }
        }
        self.recorder.record_triggers(&report.triggers).await;

        let candidates = self.resolve_candidates(&report.triggers).await;
        if !candidates.is_empty() {
            info!(
                "Orchestrator: {} triggers -> {} candidate runs ({})",
                report.triggers.len(),
                candidates.len(),
                event.reason
            );
        }

        let force = event.force;
        let runs = candidates.into_iter().map(|candidate| {
            let input = AgentInput::for_scope(&candidate.scope)
                .with_context("triggers", json!(candidate.triggers))
                .with_context("event_reason", json!(event.reason))
                .with_context("magnitude", json!(event.magnitude));
            async move {
                let result = self
                    .dispatch(&candidate.agent_key, &input, &candidate.scope, force, now)
                    .await;
                (candidate, result)
            }
        });

        for (candidate, result) in join_all(runs).await {
            match result {
                Ok((record, persisted)) => report.dispatched.push(outcome_of(&record, persisted)),
                Err(rejection) => report.skipped.push(SkippedDispatch {
                    agent_key: candidate.agent_key,
                    scope: candidate.scope,
                    reason: rejection.reason,
                }),
            }
        }
        report
    }

    pub async fn on_timer_event(&self) -> TimerOutcome {
        self.on_timer_event_at(Utc::now()).await
    }

    /// Periodic refresh over the configured product and timeframe grid.
    pub async fn on_timer_event_at(&self, now: DateTime<Utc>) -> TimerOutcome {
        if !self.flags.is_enabled(flags::BACKGROUND_KPI_JOBS) {
            debug!("Orchestrator: Background KPI jobs disabled");
            return TimerOutcome::FlagDisabled;
        }
        if self.config.market_hours_gate && !market_hours::is_trading_window(now) {
            debug!("Orchestrator: Skipping KPI refresh outside market hours");
            return TimerOutcome::OutsideMarketHours;
        }

        let event = KpiChangeEvent {
            products: self.config.products.clone(),
            timeframes: self.config.timeframes.clone(),
            magnitude: 0.0,
            force: false,
            reason: "scheduled_refresh".to_string(),
        };
        let report = self.on_kpi_change_at(event, now).await;
        info!(
            "Orchestrator: KPI refresh complete: {} triggers, {} runs, {} skipped",
            report.triggers.len(),
            report.dispatched.len(),
            report.skipped.len()
        );
        TimerOutcome::Ran(report)
    }

    pub async fn run_agent(
        &self,
        key: &str,
        input: &AgentInput,
        force: bool,
    ) -> Result<AgentOutput, AgentError> {
        self.run_agent_at(key, input, force, Utc::now()).await
    }

    /// Manual run through the full guard pipeline. A run that executed but
    /// failed is returned as an unsuccessful output, not an error.
    pub async fn run_agent_at(
        &self,
        key: &str,
        input: &AgentInput,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<AgentOutput, AgentError> {
        let scope = input.scope()?;
        let (record, _) = self
            .dispatch(key, input, &scope, force, now)
            .await
            .map_err(|rejection| rejection.error)?;
        record.output.ok_or_else(|| AgentError::Persistence {
            reason: format!("run {} carries no output", record.run_id),
        })
    }

    pub async fn run_trainer(
        &self,
        product: &str,
        timeframe: Timeframe,
        force: bool,
    ) -> Result<TrainerOutcome, AgentError> {
        self.run_trainer_at(product, timeframe, force, Utc::now()).await
    }

    /// Evaluates the retraining policy for one scope and runs the trainer
    /// when it fires. `force` skips both the cooldown and the policy, but the
    /// forced run still opens a new cooldown window.
    pub async fn run_trainer_at(
        &self,
        product: &str,
        timeframe: Timeframe,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<TrainerOutcome, AgentError> {
        if product.trim().is_empty() {
            return Err(AgentError::Validation {
                reason: "product must not be empty".to_string(),
            });
        }
        let scope = Scope::new(product.trim(), timeframe);
        let cooldown_key = cooldown_key(TRAINER_AGENT_KEY, &scope);

        let (reason, confidence) = if force {
            ("Manual force retrain requested".to_string(), 1.0)
        } else {
            if self.cooldowns.is_in_cooldown_at(&cooldown_key, now).await {
                let remaining = self.cooldowns.remaining_at(&cooldown_key, now).await;
                let decision = self.trainer.decision(
                    &scope,
                    false,
                    format!(
                        "In cooldown period (last retrain < {} days ago)",
                        self.trainer.config().cooldown_days
                    ),
                    0.0,
                    false,
                    now,
                );
                log_decision(self.store.as_ref(), &decision).await;
                self.recorder.record_skip(SkipReason::CooldownActive).await;
                return Err(AgentError::CooldownActive {
                    key: cooldown_key,
                    remaining_secs: remaining.num_seconds().max(0) as u64,
                });
            }

            let current = self.kpi.compute_at(timeframe, &scope.product, now).await;
            if current.is_neutral() {
                return Ok(self
                    .record_decision(&scope, false, "Insufficient KPI data for evaluation", 0.0, now)
                    .await);
            }
            let baseline = self.kpi.previous_bundle(timeframe, &scope.product).await;
            let last_retrain = self
                .cooldowns
                .get_state(&cooldown_key)
                .await
                .map(|s| s.last_triggered_at);

            match self
                .trainer
                .evaluate(&current, baseline.as_ref(), last_retrain, now)
            {
                Some(signal) => (signal.reason, signal.confidence),
                None => {
                    return Ok(self
                        .record_decision(
                            &scope,
                            false,
                            "All triggers within acceptable thresholds",
                            0.0,
                            now,
                        )
                        .await);
                }
            }
        };

        let decision = self
            .trainer
            .decision(&scope, true, reason, confidence, force, now);
        info!(
            "Orchestrator: Retrain triggered for {} ({}{})",
            scope,
            decision.reason,
            if force { ", forced" } else { "" }
        );

        let input = AgentInput::for_scope(&scope)
            .with_context("decision", json!(decision))
            .with_context("actions", json!(decision.actions));
        let (record, _) = self
            .dispatch(TRAINER_AGENT_KEY, &input, &scope, force, now)
            .await
            .map_err(|rejection| rejection.error)?;

        log_decision(self.store.as_ref(), &decision).await;
        Ok(TrainerOutcome {
            decision,
            output: record.output,
        })
    }

    pub async fn trainer_status(&self, product: Option<&str>) -> Vec<TrainerScopeStatus> {
        self.trainer_status_at(product, Utc::now()).await
    }

    /// Last retrain and cooldown per configured timeframe, for one product or
    /// every configured product.
    pub async fn trainer_status_at(
        &self,
        product: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<TrainerScopeStatus> {
        let products: Vec<String> = match product {
            Some(p) => vec![p.trim().to_lowercase()],
            None => self.config.products.clone(),
        };

        let mut statuses = Vec::with_capacity(products.len() * self.config.timeframes.len());
        for product in products {
            for timeframe in &self.config.timeframes {
                let scope = Scope::new(product.as_str(), *timeframe);
                let state = self
                    .cooldowns
                    .get_state(&cooldown_key(TRAINER_AGENT_KEY, &scope))
                    .await;
                let in_cooldown = state.as_ref().is_some_and(|s| s.is_active_at(now));
                statuses.push(TrainerScopeStatus {
                    product: scope.product,
                    timeframe: *timeframe,
                    last_retrain: state.as_ref().map(|s| s.last_triggered_at),
                    in_cooldown,
                    cooldown_remaining_secs: state
                        .as_ref()
                        .map(|s| s.remaining_at(now).num_seconds().max(0) as u64)
                        .unwrap_or(0),
                    next_eligible_at: state.filter(|_| in_cooldown).map(|s| s.cooldown_until),
                });
            }
        }
        statuses
    }

    async fn record_decision(
        &self,
        scope: &Scope,
        triggered: bool,
        reason: &str,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> TrainerOutcome {
        let decision = self
            .trainer
            .decision(scope, triggered, reason, confidence, false, now);
        log_decision(self.store.as_ref(), &decision).await;
        TrainerOutcome {
            decision,
            output: None,
        }
    }

    /// Maps triggers to agents, one candidate per (agent, scope).
    async fn resolve_candidates(&self, triggers: &[Trigger]) -> Vec<Candidate> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        for trigger in triggers {
            let agents = self
                .registry
                .agents_for_trigger(trigger.trigger_type, &trigger.scope.product)
                .await;
            for agent_key in agents {
                let identity = (agent_key.clone(), trigger.scope.key());
                if seen.insert(identity.clone()) {
                    candidates.push(Candidate {
                        agent_key,
                        scope: trigger.scope.clone(),
                        triggers: vec![trigger.clone()],
                    });
                } else if let Some(existing) = candidates
                    .iter_mut()
                    .find(|c| c.agent_key == identity.0 && c.scope.key() == identity.1)
                {
                    existing.triggers.push(trigger.clone());
                }
            }
        }
        candidates
    }

    /// Guard pipeline plus run plus persist. Rejections are counted as skips.
    async fn dispatch(
        &self,
        key: &str,
        input: &AgentInput,
        scope: &Scope,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<(RunRecord, bool), GuardRejection> {
        let Some(_slot) = self.admit().await else {
            return Err(self
                .reject(
                    key,
                    SkipReason::NotRunning,
                    AgentError::Unavailable {
                        reason: "orchestrator is not running".to_string(),
                    },
                )
                .await);
        };

        let descriptor = self.check_guards(key, scope, force, now).await?;

        let started_at = Utc::now();
        let output = self.runner.run_agent(key, input).await;
        let finished_at = Utc::now();

        let record = RunRecord::from_output(scope.clone(), output, started_at, finished_at);
        let persisted = self.outputs.save_output(&record).await;
        if !persisted {
            warn!(
                "Orchestrator: Run {} of '{}' was not persisted",
                record.run_id, key
            );
        }
        self.recorder
            .record_run(key, record.success, record.duration_ms, finished_at)
            .await;
        debug!(
            "Orchestrator: '{}' ran for {} in {}ms (success={}, timeout={}s)",
            key,
            scope,
            record.duration_ms,
            record.success,
            descriptor.max_runtime_sec.unwrap_or(self.config.agent_timeout_secs)
        );
        Ok((record, persisted))
    }

    async fn check_guards(
        &self,
        key: &str,
        scope: &Scope,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<AgentDescriptor, GuardRejection> {
        if !self.flags.is_enabled(flags::AGENTS_FRAMEWORK) {
            return Err(self
                .reject(
                    key,
                    SkipReason::FrameworkDisabled,
                    AgentError::Unavailable {
                        reason: "agents framework is disabled".to_string(),
                    },
                )
                .await);
        }

        let Some(descriptor) = self.registry.get(key).await else {
            return Err(self
                .reject(
                    key,
                    SkipReason::AgentNotFound,
                    AgentError::AgentNotFound {
                        key: key.to_string(),
                    },
                )
                .await);
        };

        if !descriptor.enabled {
            return Err(self
                .reject(
                    key,
                    SkipReason::AgentDisabled,
                    AgentError::AgentDisabled {
                        key: key.to_string(),
                    },
                )
                .await);
        }

        if !self.flags.is_enabled(&flags::agent(key)) {
            return Err(self
                .reject(
                    key,
                    SkipReason::AgentFlagDisabled,
                    AgentError::AgentDisabled {
                        key: key.to_string(),
                    },
                )
                .await);
        }

        let cooldown_key = cooldown_key(key, scope);
        if !force && self.cooldowns.is_in_cooldown_at(&cooldown_key, now).await {
            let remaining = self.cooldowns.remaining_at(&cooldown_key, now).await;
            return Err(self
                .reject(
                    key,
                    SkipReason::CooldownActive,
                    AgentError::CooldownActive {
                        key: cooldown_key,
                        remaining_secs: remaining.num_seconds().max(0) as u64,
                    },
                )
                .await);
        }

        if !self.rate_limiter.is_allowed_at(key, now).await {
            let retry_after_secs = self.rate_limiter.retry_after_secs(key, now).await;
            return Err(self
                .reject(
                    key,
                    SkipReason::RateLimited,
                    AgentError::RateLimitExceeded {
                        key: key.to_string(),
                        retry_after_secs,
                    },
                )
                .await);
        }

        // Claim the cooldown before running so concurrent events cannot
        // dispatch the same (agent, scope) twice.
        let duration = self.cooldown_for(&descriptor);
        if let Err(blocking) = self
            .cooldowns
            .try_begin_at(&cooldown_key, duration, now, force)
            .await
        {
            // Lost the claim to a concurrent dispatch; the slot was never used
            self.rate_limiter.release_at(key, now).await;
            return Err(self
                .reject(
                    key,
                    SkipReason::CooldownActive,
                    AgentError::CooldownActive {
                        key: cooldown_key,
                        remaining_secs: blocking.remaining_at(now).num_seconds().max(0) as u64,
                    },
                )
                .await);
        }

        Ok(descriptor)
    }

    fn cooldown_for(&self, descriptor: &AgentDescriptor) -> chrono::Duration {
        match descriptor.cooldown_secs {
            Some(secs) => chrono::Duration::seconds(secs as i64),
            None if descriptor.key == TRAINER_AGENT_KEY => self.trainer.cooldown(),
            None => chrono::Duration::seconds(self.config.default_cooldown_secs as i64),
        }
    }

    async fn admit(&self) -> Option<InFlight<'_>> {
        let state = self.state.read().await;
        if *state != OrchestratorState::Running {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(InFlight {
            counter: &self.in_flight,
            drained: &self.drained,
        })
    }

    async fn reject(&self, key: &str, reason: SkipReason, error: AgentError) -> GuardRejection {
        info!("Orchestrator: Skipping '{}': {}", key, error);
        self.recorder.record_skip(reason).await;
        GuardRejection { reason, error }
    }
}

pub fn cooldown_key(agent_key: &str, scope: &Scope) -> String {
    format!("{}:{}", agent_key, scope.key())
}

fn outcome_of(record: &RunRecord, persisted: bool) -> DispatchOutcome {
    DispatchOutcome {
        run_id: record.run_id,
        agent_key: record.agent_key.clone(),
        scope: record.scope.clone(),
        success: record.success,
        verdict: record
            .output
            .as_ref()
            .map(|o| o.verdict_normalized)
            .unwrap_or(CanonicalVerdict::Hold),
        duration_ms: record.duration_ms,
        persisted,
    }
}
