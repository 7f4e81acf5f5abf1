use crate::domain::errors::{AgentError, ErrorKind};
use crate::domain::kpi::TriggerType;
use crate::domain::scope::{Scope, Timeframe};
use crate::domain::verdict::CanonicalVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Static description of an agent, owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub key: String,
    pub display_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Per-agent compute timeout; falls back to the runner default.
    #[serde(default)]
    pub max_runtime_sec: Option<u64>,
    /// Minimum spacing between triggered runs for one scope.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default)]
    pub rate_limit_per_window: Option<u32>,
    /// Trigger types this agent answers.
    #[serde(default)]
    pub triggers: Vec<TriggerType>,
    /// Products this agent serves; empty means every product.
    #[serde(default)]
    pub products: Vec<String>,
}

impl AgentDescriptor {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            enabled: true,
            config: HashMap::new(),
            max_runtime_sec: None,
            cooldown_secs: None,
            rate_limit_per_window: None,
            triggers: Vec::new(),
            products: Vec::new(),
        }
    }

    pub fn with_triggers(mut self, triggers: &[TriggerType]) -> Self {
        self.triggers = triggers.to_vec();
        self
    }

    pub fn with_products(mut self, products: &[&str]) -> Self {
        self.products = products.iter().map(|p| p.to_lowercase()).collect();
        self
    }

    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = Some(secs);
        self
    }

    pub fn answers(&self, trigger: TriggerType) -> bool {
        self.triggers.contains(&trigger)
    }

    pub fn serves_product(&self, product: &str) -> bool {
        self.products.is_empty()
            || product == crate::domain::scope::ALL_PRODUCTS
            || self.products.iter().any(|p| p.eq_ignore_ascii_case(product))
    }
}

/// Registry view of an agent, returned by `list_agents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(flatten)]
    pub descriptor: AgentDescriptor,
    pub has_compute: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success: Option<bool>,
}

/// Caller-built input for one agent call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    #[serde(default)]
    pub context: Map<String, Value>,
    pub product: String,
    pub timeframe: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

impl AgentInput {
    pub fn new(product: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            context: Map::new(),
            product: product.into(),
            timeframe: timeframe.as_str().to_string(),
            symbol: None,
        }
    }

    pub fn for_scope(scope: &Scope) -> Self {
        Self {
            context: Map::new(),
            product: scope.product.clone(),
            timeframe: scope.timeframe.as_str().to_string(),
            symbol: scope.symbol.clone(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Validated scope of this input.
    pub fn scope(&self) -> Result<Scope, AgentError> {
        if self.product.trim().is_empty() {
            return Err(AgentError::Validation {
                reason: "product must not be empty".to_string(),
            });
        }
        let timeframe: Timeframe =
            self.timeframe
                .parse()
                .map_err(|e: anyhow::Error| AgentError::Validation {
                    reason: e.to_string(),
                })?;
        let mut scope = Scope::new(self.product.as_str(), timeframe);
        if let Some(symbol) = self.symbol.as_deref().filter(|s| !s.trim().is_empty()) {
            scope = scope.with_symbol(symbol.trim());
        }
        Ok(scope)
    }
}

/// What an agent's compute function hands back, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAgentOutput {
    pub verdict: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RawAgentOutput {
    pub fn new(verdict: impl Into<String>, confidence: f64) -> Self {
        Self {
            verdict: verdict.into(),
            confidence,
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

/// Result of one agent run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent_key: String,
    pub verdict_raw: String,
    pub verdict_normalized: CanonicalVerdict,
    pub confidence: f64,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub success: bool,
    pub error: Option<ErrorKind>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl AgentOutput {
    pub fn failure(agent_key: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            agent_key: agent_key.to_string(),
            verdict_raw: "ERROR".to_string(),
            verdict_normalized: CanonicalVerdict::Hold,
            confidence: 0.0,
            reasons: vec![message.clone()],
            insights: Vec::new(),
            actions: Vec::new(),
            risk_flags: Vec::new(),
            metadata: Map::new(),
            success: false,
            error: Some(kind),
            error_message: Some(message),
        }
    }

    /// Converts a failed output into the error callers surface.
    pub fn into_result(self) -> Result<AgentOutput, AgentError> {
        match self.error {
            Some(kind) if !self.success => Err(AgentError::from_output_error(
                &self.agent_key,
                kind,
                self.error_message.as_deref(),
            )),
            _ => Ok(self),
        }
    }

    /// One-line summary stored on run records.
    pub fn summary(&self) -> String {
        if self.success {
            format!(
                "{} ({:.0}%)",
                self.verdict_normalized.as_str(),
                self.confidence
            )
        } else {
            format!(
                "{}: {}",
                self.error.map(|k| k.as_str()).unwrap_or("FAILED"),
                self.error_message.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_scope_validation() {
        let input = AgentInput::new("Equities", Timeframe::FiveDay);
        assert_eq!(input.scope().unwrap(), Scope::new("equities", Timeframe::FiveDay));

        let mut bad = input.clone();
        bad.timeframe = "1Y".to_string();
        assert!(matches!(bad.scope(), Err(AgentError::Validation { .. })));

        let mut empty = input;
        empty.product = "  ".to_string();
        assert!(matches!(empty.scope(), Err(AgentError::Validation { .. })));
    }

    #[test]
    fn test_failure_output_into_result() {
        let out = AgentOutput::failure("sentiment", ErrorKind::AgentDisabled, "disabled");
        assert_eq!(out.verdict_normalized, CanonicalVerdict::Hold);
        assert!(matches!(
            out.into_result(),
            Err(AgentError::AgentDisabled { key }) if key == "sentiment"
        ));
    }

    #[test]
    fn test_descriptor_product_affinity() {
        let d = AgentDescriptor::new("equity", "Equity").with_products(&["Equities"]);
        assert!(d.serves_product("equities"));
        assert!(d.serves_product("all"));
        assert!(!d.serves_product("options"));
        assert!(AgentDescriptor::new("trainer", "Trainer").serves_product("options"));
    }
}
