use goahead::application::agents::{AgentRegistry, AgentRunner};
use goahead::domain::agents::{AgentDescriptor, AgentInput};
use goahead::domain::errors::ErrorKind;
use goahead::domain::ports::AgentCompute;
use goahead::domain::scope::Timeframe;
use goahead::domain::verdict::{CanonicalVerdict, VerdictNormalizer};
use goahead::infrastructure::mock::{MockAgent, MockBehavior};
use std::sync::Arc;
use std::time::Duration;

async fn runner_with(key: &str, agent: Option<MockAgent>) -> (Arc<AgentRegistry>, AgentRunner) {
    let registry = Arc::new(AgentRegistry::new());
    registry
        .register(
            AgentDescriptor::new(key, "Test Agent"),
            agent.map(|a| Arc::new(a) as Arc<dyn AgentCompute>),
        )
        .await;
    let runner = AgentRunner::with_timeout(
        registry.clone(),
        Arc::new(VerdictNormalizer::new()),
        Duration::from_millis(100),
    );
    (registry, runner)
}

fn input() -> AgentInput {
    AgentInput::new("equities", Timeframe::FiveDay).with_context("symbol_count", 3.into())
}

#[tokio::test]
async fn test_successful_run_is_normalized_and_stamped() {
    let (registry, runner) = runner_with("options", Some(MockAgent::new("EXECUTE", 140.0))).await;

    let output = runner.run_agent("options", &input()).await;
    assert!(output.success);
    assert_eq!(output.verdict_raw, "EXECUTE");
    assert_eq!(output.verdict_normalized, CanonicalVerdict::StrongBuy);
    assert_eq!(output.confidence, 100.0);
    for key in ["agent_name", "execution_time_ms", "input_hash", "timestamp"] {
        assert!(output.metadata.contains_key(key), "missing {}", key);
    }

    let status = registry.list_agents().await;
    assert_eq!(status[0].last_success, Some(true));
    assert!(status[0].last_run_at.is_some());
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let slow = MockAgent::new("BUY", 60.0).with_delay(Duration::from_secs(5));
    let (_, runner) = runner_with("equity", Some(slow)).await;

    let started = std::time::Instant::now();
    let output = runner.run_agent("equity", &input()).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!output.success);
    assert_eq!(output.error, Some(ErrorKind::AgentTimeout));
    assert_eq!(output.verdict_normalized, CanonicalVerdict::Hold);
}

#[tokio::test]
async fn test_faults_become_failed_outputs() {
    let agent = MockAgent::new("BUY", 60.0);
    let (registry, runner) = runner_with("equity", Some(agent.clone())).await;

    agent.set_behavior(MockBehavior::Fail("upstream 502".into())).await;
    let output = runner.run_agent("equity", &input()).await;
    assert_eq!(output.error, Some(ErrorKind::AgentFault));
    assert!(output.error_message.unwrap().contains("upstream 502"));

    agent.set_behavior(MockBehavior::Panic).await;
    let output = runner.run_agent("equity", &input()).await;
    assert!(!output.success);
    assert_eq!(output.error, Some(ErrorKind::AgentFault));

    agent.set_behavior(MockBehavior::Respond).await;
    assert!(runner.run_agent("equity", &input()).await.success);
    assert_eq!(agent.calls(), 3);
    assert_eq!(registry.list_agents().await[0].last_success, Some(true));
}

#[tokio::test]
async fn test_policy_failures_skip_compute() {
    let agent = MockAgent::new("BUY", 60.0);
    let (registry, runner) = runner_with("equity", Some(agent.clone())).await;

    let unknown = runner.run_agent("nobody", &input()).await;
    assert_eq!(unknown.error, Some(ErrorKind::AgentNotFound));

    let mut bad = input();
    bad.product = "  ".to_string();
    assert_eq!(
        runner.run_agent("equity", &bad).await.error,
        Some(ErrorKind::Validation)
    );

    registry.disable("equity").await.unwrap();
    let disabled = runner.run_agent("equity", &input()).await;
    assert_eq!(disabled.error, Some(ErrorKind::AgentDisabled));
    assert!(disabled.into_result().is_err());

    assert_eq!(agent.calls(), 0);
}

#[tokio::test]
async fn test_unbound_agent_reports_fault() {
    let (_, runner) = runner_with("new", None).await;
    let output = runner.run_agent("new", &input()).await;
    assert!(!output.success);
    assert_eq!(output.error, Some(ErrorKind::AgentFault));
}
