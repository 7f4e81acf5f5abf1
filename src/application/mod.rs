// Agent registry and runner
pub mod agents;
pub mod bootstrap;

// KPI computation and trigger evaluation
pub mod kpi;

// Event-driven dispatch
pub mod orchestrator;

// Rate limits and cooldowns
pub mod risk_management;

// Composition root
pub mod system;
