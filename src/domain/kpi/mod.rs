pub mod bundle;
pub mod metric;
pub mod policy;
pub mod record;
pub mod thresholds;
pub mod trend;
pub mod trigger;

pub use bundle::{FinancialKpis, KpiBundle, KpiStatus, PredictionQuality, RiskKpis, VolRegime};
pub use metric::{Metric, MetricCategory};
pub use record::{Direction, PredictionRecord};
pub use thresholds::{MetricThreshold, ThresholdTable};
pub use trend::{TrendDirection, TrendPoint};
pub use trigger::{Severity, Trigger, TriggerType};
