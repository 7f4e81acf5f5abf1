use crate::domain::agents::{AgentInput, RawAgentOutput};
use crate::domain::ports::AgentCompute;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    Respond,
    Fail(String),
    Panic,
}

/// Deterministic agent used in tests and demo mode.
///
/// Responds with a fixed raw verdict after an optional delay. The behavior can
/// be switched at runtime, and every call is counted.
#[derive(Clone)]
pub struct MockAgent {
    verdict: Arc<RwLock<String>>,
    confidence: f64,
    delay: Duration,
    behavior: Arc<RwLock<MockBehavior>>,
    calls: Arc<AtomicUsize>,
}

impl MockAgent {
    pub fn new(verdict: impl Into<String>, confidence: f64) -> Self {
        Self {
            verdict: Arc::new(RwLock::new(verdict.into())),
            confidence,
            delay: Duration::ZERO,
            behavior: Arc::new(RwLock::new(MockBehavior::Respond)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        let mut agent = Self::new("ERROR", 0.0);
        agent.behavior = Arc::new(RwLock::new(MockBehavior::Fail(reason.into())));
        agent
    }

    pub fn panicking() -> Self {
        let mut agent = Self::new("ERROR", 0.0);
        agent.behavior = Arc::new(RwLock::new(MockBehavior::Panic));
        agent
    }

    /// Demo compute for a registry key, speaking that agent's vocabulary.
    pub fn for_agent(key: &str) -> Self {
        let (verdict, confidence) = match key {
            "equity" => ("BUY", 72.0),
            "options" => ("FAVORABLE", 64.0),
            "sentiment" => ("BULLISH", 58.0),
            "trainer" => ("MODEL_STABLE", 80.0),
            "comm" => ("CONFIDENT", 66.0),
            "dev" => ("STABLE", 90.0),
            "new" => ("PROMISING", 55.0),
            _ => ("NEUTRAL", 50.0),
        };
        Self::new(verdict, confidence)
    }

    pub async fn set_verdict(&self, verdict: impl Into<String>) {
        *self.verdict.write().await = verdict.into();
    }

    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentCompute for MockAgent {
    async fn compute(&self, input: &AgentInput) -> Result<RawAgentOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let behavior = self.behavior.read().await.clone();
        match behavior {
            MockBehavior::Respond => {}
            MockBehavior::Fail(reason) => anyhow::bail!(reason),
            MockBehavior::Panic => panic!("MockAgent: simulated panic"),
        }

        let verdict = self.verdict.read().await.clone();
        debug!(
            "MockAgent: {} {} -> {}",
            input.product, input.timeframe, verdict
        );
        let mut output = RawAgentOutput::new(verdict, self.confidence)
            .with_reason(format!("Mock analysis for {} {}", input.product, input.timeframe));
        output
            .metadata
            .insert("mock".to_string(), json!(true));
        if let Some(symbol) = &input.symbol {
            output.metadata.insert("symbol".to_string(), json!(symbol));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::Timeframe;

    #[tokio::test]
    async fn test_mock_agent_responds_and_counts() {
        let agent = MockAgent::for_agent("options");
        let input = AgentInput::new("options", Timeframe::FiveDay);

        let output = agent.compute(&input).await.unwrap();
        assert_eq!(output.verdict, "FAVORABLE");
        assert_eq!(output.reasons.len(), 1);
        assert_eq!(agent.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_agent_behavior_switch() {
        let agent = MockAgent::new("BUY", 70.0);
        let input = AgentInput::new("equities", Timeframe::ThreeDay);

        agent.set_behavior(MockBehavior::Fail("model offline".into())).await;
        let err = agent.compute(&input).await.unwrap_err();
        assert!(err.to_string().contains("model offline"));

        agent.set_behavior(MockBehavior::Respond).await;
        agent.set_verdict("STRONG_BUY").await;
        assert_eq!(agent.compute(&input).await.unwrap().verdict, "STRONG_BUY");
        assert_eq!(agent.calls(), 2);
    }
}
