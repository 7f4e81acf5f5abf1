use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    PredictionQuality,
    Financial,
    Risk,
}

/// Every metric carried by a `KpiBundle` that can breach a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HitRate,
    BrierScore,
    Mape,
    Precision,
    Recall,
    Sharpe,
    Sortino,
    PnlGrowth,
    MaxDrawdown,
    Var95,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::HitRate,
        Metric::BrierScore,
        Metric::Mape,
        Metric::Precision,
        Metric::Recall,
        Metric::Sharpe,
        Metric::Sortino,
        Metric::PnlGrowth,
        Metric::MaxDrawdown,
        Metric::Var95,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HitRate => "hit_rate",
            Metric::BrierScore => "brier_score",
            Metric::Mape => "mape",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::Sharpe => "sharpe",
            Metric::Sortino => "sortino",
            Metric::PnlGrowth => "pnl_growth",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::Var95 => "var_95",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        !matches!(
            self,
            Metric::BrierScore | Metric::Mape | Metric::MaxDrawdown | Metric::Var95
        )
    }

    pub fn category(&self) -> MetricCategory {
        match self {
            Metric::HitRate
            | Metric::BrierScore
            | Metric::Mape
            | Metric::Precision
            | Metric::Recall => MetricCategory::PredictionQuality,
            Metric::Sharpe | Metric::Sortino | Metric::PnlGrowth => MetricCategory::Financial,
            Metric::MaxDrawdown | Metric::Var95 => MetricCategory::Risk,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == needle)
            .ok_or_else(|| anyhow::anyhow!("Unknown KPI metric: {}", s))
    }
}
