use crate::domain::agents::AgentOutput;
use crate::domain::scope::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable audit entry for one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub agent_key: String,
    pub scope: Scope,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub summary: String,
    /// Storage key of the latest snapshot this run wrote.
    pub output_ref: String,
    #[serde(default)]
    pub output: Option<AgentOutput>,
}

impl RunRecord {
    pub fn from_output(
        scope: Scope,
        output: AgentOutput,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            run_id: Uuid::new_v4(),
            agent_key: output.agent_key.clone(),
            output_ref: latest_output_key(&output.agent_key, &scope),
            scope,
            started_at,
            finished_at,
            duration_ms,
            success: output.success,
            summary: output.summary(),
            output: Some(output),
        }
    }
}

pub fn latest_output_key(agent_key: &str, scope: &Scope) -> String {
    format!("agents/outputs/{}/latest/{}", agent_key, scope.key())
}

pub fn history_key(agent_key: &str) -> String {
    format!("agents/outputs/{}/history", agent_key)
}

pub const GLOBAL_HISTORY_KEY: &str = "agents/outputs/_global/history";

/// Appends `item` and drops the oldest entries beyond `cap`.
pub fn append_capped<T>(history: &mut Vec<T>, item: T, cap: usize) {
    history.push(item);
    if history.len() > cap {
        let overflow = history.len() - cap;
        history.drain(..overflow);
    }
}

/// Retraining decision produced by the trainer flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerDecision {
    pub triggered: bool,
    pub reason: String,
    pub actions: Vec<String>,
    pub product: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub confidence_score: f64,
    pub force_triggered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_capped_drops_oldest() {
        let mut history: Vec<u32> = Vec::new();
        for i in 0..15 {
            append_capped(&mut history, i, 10);
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.first(), Some(&5));
        assert_eq!(history.last(), Some(&14));
    }

    #[test]
    fn test_append_capped_zero_cap_keeps_nothing() {
        let mut history = vec![1, 2];
        append_capped(&mut history, 3, 0);
        assert!(history.is_empty());
    }
}
