//! Executes a single agent call under contract.
//!
//! The call goes through an explicit middleware chain:
//! `timed` → `fingerprinted` → `with_timeout` → compute. Every failure mode
//! (unknown key, disabled, bad input, error, panic, timeout) becomes a failed
//! `AgentOutput`; nothing propagates to the caller.

use crate::application::agents::registry::AgentRegistry;
use crate::domain::agents::{AgentInput, AgentOutput, RawAgentOutput};
use crate::domain::errors::ErrorKind;
use crate::domain::ports::AgentCompute;
use crate::domain::verdict::VerdictNormalizer;
use chrono::Utc;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AgentRunner {
    registry: Arc<AgentRegistry>,
    normalizer: Arc<VerdictNormalizer>,
    default_timeout: Duration,
}

impl AgentRunner {
    pub fn new(registry: Arc<AgentRegistry>, normalizer: Arc<VerdictNormalizer>) -> Self {
        Self::with_timeout(registry, normalizer, DEFAULT_AGENT_TIMEOUT)
    }

    pub fn with_timeout(
        registry: Arc<AgentRegistry>,
        normalizer: Arc<VerdictNormalizer>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            normalizer,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub async fn run_agent(&self, key: &str, input: &AgentInput) -> AgentOutput {
        let Some(binding) = self.registry.binding(key).await else {
            warn!("AgentRunner: Unknown agent '{}'", key);
            return AgentOutput::failure(key, ErrorKind::AgentNotFound, format!("Agent not found: {}", key));
        };

        if !binding.descriptor.enabled {
            info!("AgentRunner: Agent '{}' is disabled, not running", key);
            return AgentOutput::failure(key, ErrorKind::AgentDisabled, format!("Agent is disabled: {}", key));
        }

        if let Err(e) = input.scope() {
            return AgentOutput::failure(key, ErrorKind::Validation, e.to_string());
        }

        let Some(compute) = binding.compute else {
            warn!("AgentRunner: Agent '{}' has no compute bound", key);
            return AgentOutput::failure(
                key,
                ErrorKind::AgentFault,
                format!("No compute implementation bound for {}", key),
            );
        };

        let timeout = binding
            .descriptor
            .max_runtime_sec
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let input_hash = hash_input(input);
        let (result, elapsed) = timed(with_timeout(timeout, spawn_compute(compute, input.clone()))).await;

        let mut output = match result {
            Ok(raw) => self.finish(key, raw),
            Err((kind, message)) => {
                warn!("AgentRunner: Agent '{}' failed ({}): {}", key, kind, message);
                AgentOutput::failure(key, kind, message)
            }
        };

        output
            .metadata
            .insert("agent_name".to_string(), json!(key));
        output.metadata.insert(
            "execution_time_ms".to_string(),
            json!(elapsed.as_millis() as u64),
        );
        output
            .metadata
            .insert("input_hash".to_string(), Value::String(input_hash));
        output
            .metadata
            .insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));

        self.registry.record_run(key, output.success, Utc::now()).await;
        output
    }

    fn finish(&self, key: &str, raw: RawAgentOutput) -> AgentOutput {
        let verdict_normalized = self.normalizer.normalize(key, &raw.verdict);
        AgentOutput {
            agent_key: key.to_string(),
            verdict_normalized,
            verdict_raw: raw.verdict,
            confidence: clamp_confidence(raw.confidence),
            reasons: raw.reasons,
            insights: raw.insights,
            actions: raw.actions,
            risk_flags: raw.risk_flags,
            metadata: raw.metadata,
            success: true,
            error: None,
            error_message: None,
        }
    }
}

type ComputeResult = Result<RawAgentOutput, (ErrorKind, String)>;

/// Runs compute on its own task so a panic surfaces as a `JoinError`.
fn spawn_compute(
    compute: Arc<dyn AgentCompute>,
    input: AgentInput,
) -> tokio::task::JoinHandle<anyhow::Result<RawAgentOutput>> {
    tokio::spawn(async move { compute.compute(&input).await })
}

/// Bounds the compute task; aborts it on expiry.
async fn with_timeout(
    timeout: Duration,
    mut handle: tokio::task::JoinHandle<anyhow::Result<RawAgentOutput>>,
) -> ComputeResult {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(raw))) => Ok(raw),
        Ok(Ok(Err(e))) => Err((ErrorKind::AgentFault, format!("{:#}", e))),
        Ok(Err(join_err)) if join_err.is_panic() => {
            Err((ErrorKind::AgentFault, "Agent panicked".to_string()))
        }
        Ok(Err(join_err)) => Err((ErrorKind::AgentFault, join_err.to_string())),
        Err(_) => {
            handle.abort();
            Err((
                ErrorKind::AgentTimeout,
                format!("Agent timed out after {}ms", timeout.as_millis()),
            ))
        }
    }
}

async fn timed<F: Future>(fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed())
}

/// SHA-256 of the canonical JSON encoding of `input`.
pub fn hash_input(input: &AgentInput) -> String {
    // serde_json::Map is ordered by key, so encoding is canonical
    let encoded = serde_json::to_vec(input).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

/// Clamps into [0, 100]; NaN becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 100.0)
    }
}
