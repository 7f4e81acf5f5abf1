use crate::domain::kpi::metric::Metric;
use crate::domain::scope::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Retrain,
    TightenRisk,
    Throttle,
    Alert,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Retrain => "RETRAIN",
            TriggerType::TightenRisk => "TIGHTEN_RISK",
            TriggerType::Throttle => "THROTTLE",
            TriggerType::Alert => "ALERT",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RETRAIN" => Ok(TriggerType::Retrain),
            "TIGHTEN_RISK" => Ok(TriggerType::TightenRisk),
            "THROTTLE" => Ok(TriggerType::Throttle),
            "ALERT" => Ok(TriggerType::Alert),
            _ => anyhow::bail!("Invalid trigger type: {}", s),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Policy signal derived from one KPI evaluation. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub scope: Scope,
    /// `None` for composite triggers spanning several metrics.
    pub metric: Option<Metric>,
    pub severity: Severity,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
}

impl Trigger {
    /// Identity used for set comparisons: type, scope and metric.
    pub fn identity(&self) -> (TriggerType, String, Option<Metric>) {
        (self.trigger_type, self.scope.key(), self.metric)
    }
}

/// Highest severity in a trigger list.
pub fn max_severity(triggers: &[Trigger]) -> Option<Severity> {
    triggers.iter().map(|t| t.severity).max()
}
