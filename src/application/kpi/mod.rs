pub mod calculator;
pub mod kpi_service;

pub use kpi_service::{KpiReport, KpiService};
