//! Event-driven orchestration: KPI changes and timer ticks in, guarded agent
//! runs out.

pub mod market_hours;
pub mod metrics;
pub mod orchestrator;
pub mod trainer;

pub use metrics::{MetricsRecorder, OrchestratorMetrics, SkipReason};
pub use orchestrator::{
    DispatchOutcome, DispatchReport, GuardRejection, KpiChangeEvent, Orchestrator,
    OrchestratorServices, OrchestratorState, SkippedDispatch, TimerOutcome,
};
pub use trainer::{TrainerOutcome, TrainerPolicy, TrainerScopeStatus};
