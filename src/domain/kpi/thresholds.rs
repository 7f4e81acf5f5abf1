use crate::domain::kpi::metric::Metric;
use crate::domain::scope::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Target for one metric: an "all timeframes" default plus per-window overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub all: f64,
    /// Keyed by timeframe label (`"3D"`, `"30D"`, ...).
    #[serde(flatten)]
    pub by_timeframe: HashMap<String, f64>,
}

impl MetricThreshold {
    pub fn uniform(all: f64) -> Self {
        Self {
            all,
            by_timeframe: HashMap::new(),
        }
    }

    pub fn with(mut self, timeframe: Timeframe, value: f64) -> Self {
        self.by_timeframe.insert(timeframe.as_str().to_string(), value);
        self
    }

    pub fn for_timeframe(&self, timeframe: Timeframe) -> f64 {
        self.by_timeframe
            .get(timeframe.as_str())
            .copied()
            .unwrap_or(self.all)
    }
}

/// Threshold table used by trigger evaluation.
///
/// Loaded from TOML:
///
/// ```toml
/// warn_band = 0.1
/// min_samples = 1
///
/// [metrics.brier_score]
/// all = 0.22
/// "3D" = 0.18
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    /// Fraction of the threshold treated as the soft-alert band.
    #[serde(default = "default_warn_band")]
    pub warn_band: f64,
    /// Bundles with fewer samples are treated as insufficient data.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default)]
    pub metrics: HashMap<String, MetricThreshold>,
}

fn default_warn_band() -> f64 {
    0.10
}

fn default_min_samples() -> usize {
    1
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let mut metrics = HashMap::new();
        let brier = MetricThreshold::uniform(0.22)
            .with(Timeframe::ThreeDay, 0.18)
            .with(Timeframe::FiveDay, 0.18)
            .with(Timeframe::TenDay, 0.22)
            .with(Timeframe::FifteenDay, 0.22)
            .with(Timeframe::ThirtyDay, 0.22);
        metrics.insert(Metric::BrierScore.as_str().to_string(), brier);

        for (metric, value) in [
            (Metric::HitRate, 0.62),
            (Metric::Precision, 0.60),
            (Metric::Recall, 0.55),
            (Metric::Mape, 0.25),
            (Metric::Sharpe, 1.2),
            (Metric::Sortino, 2.0),
            (Metric::PnlGrowth, 0.0),
            (Metric::MaxDrawdown, 0.05),
            (Metric::Var95, 0.005),
        ] {
            metrics.insert(metric.as_str().to_string(), MetricThreshold::uniform(value));
        }

        Self {
            warn_band: default_warn_band(),
            min_samples: default_min_samples(),
            metrics,
        }
    }
}

impl ThresholdTable {
    /// Threshold for (metric, timeframe), falling back to the metric's "all" value.
    /// `None` when the metric is not configured at all.
    pub fn threshold(&self, metric: Metric, timeframe: Timeframe) -> Option<f64> {
        self.metrics
            .get(metric.as_str())
            .map(|t| t.for_timeframe(timeframe))
            .filter(|v| v.is_finite())
    }

    pub fn set(&mut self, metric: Metric, threshold: MetricThreshold) {
        self.metrics.insert(metric.as_str().to_string(), threshold);
    }

    /// Parses a TOML table; metrics missing from the file keep their defaults.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let parsed: ThresholdTable = toml::from_str(content)?;
        let mut table = ThresholdTable::default();
        table.warn_band = parsed.warn_band.max(0.0);
        table.min_samples = parsed.min_samples;
        for (name, threshold) in parsed.metrics {
            let metric: Metric = name.parse()?;
            table.set(metric, threshold);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let t = ThresholdTable::default();
        assert_eq!(t.threshold(Metric::BrierScore, Timeframe::ThreeDay), Some(0.18));
        assert_eq!(t.threshold(Metric::BrierScore, Timeframe::ThirtyDay), Some(0.22));
        assert_eq!(t.threshold(Metric::BrierScore, Timeframe::All), Some(0.22));
        assert_eq!(t.threshold(Metric::HitRate, Timeframe::TenDay), Some(0.62));
        assert_eq!(t.threshold(Metric::MaxDrawdown, Timeframe::All), Some(0.05));
    }

    #[test]
    fn test_toml_override_keeps_other_defaults() {
        let toml = r#"
            warn_band = 0.2
            min_samples = 5

            [metrics.hit_rate]
            all = 0.55
            "3D" = 0.5
        "#;
        let t = ThresholdTable::from_toml_str(toml).unwrap();
        assert_eq!(t.warn_band, 0.2);
        assert_eq!(t.min_samples, 5);
        assert_eq!(t.threshold(Metric::HitRate, Timeframe::ThreeDay), Some(0.5));
        assert_eq!(t.threshold(Metric::HitRate, Timeframe::FiveDay), Some(0.55));
        assert_eq!(t.threshold(Metric::Sharpe, Timeframe::FiveDay), Some(1.2));
    }

    #[test]
    fn test_toml_unknown_metric_is_rejected() {
        let toml = r#"
            [metrics.alpha]
            all = 1.0
        "#;
        assert!(ThresholdTable::from_toml_str(toml).is_err());
    }
}
