// Agent descriptors, inputs and outputs
pub mod agents;

// Domain-specific error types
pub mod errors;

// KPI bundles, thresholds, triggers and trends
pub mod kpi;

// Port interfaces
pub mod ports;

// Run audit records and trainer decisions
pub mod run_record;

// Product / timeframe scoping
pub mod scope;

// Canonical verdict scale
pub mod verdict;
