use crate::domain::kpi::bundle::KpiBundle;
use crate::domain::kpi::metric::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deltas smaller than this are reported as flat.
pub const FLAT_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Improving, relative to the metric's polarity.
    Up,
    Down,
    Flat,
}

impl TrendDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            TrendDirection::Up => "↑",
            TrendDirection::Down => "↓",
            TrendDirection::Flat => "→",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub direction: TrendDirection,
    pub arrow: String,
    /// Raw `current - previous`.
    pub delta: f64,
    pub delta_pct: f64,
}

pub fn trend_for(metric: Metric, current: f64, previous: f64) -> TrendPoint {
    let delta = current - previous;
    let direction = if !delta.is_finite() || delta.abs() < FLAT_EPSILON {
        TrendDirection::Flat
    } else if (delta > 0.0) == metric.higher_is_better() {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };
    let delta_pct = if previous.abs() > f64::EPSILON && delta.is_finite() {
        delta / previous.abs() * 100.0
    } else {
        0.0
    };

    TrendPoint {
        direction,
        arrow: direction.arrow().to_string(),
        delta: if delta.is_finite() { delta } else { 0.0 },
        delta_pct,
    }
}

/// Per-metric trends between two bundles, keyed by metric name.
pub fn calculate_trends(current: &KpiBundle, previous: &KpiBundle) -> BTreeMap<String, TrendPoint> {
    Metric::ALL
        .into_iter()
        .map(|m| {
            (
                m.as_str().to_string(),
                trend_for(m, current.metric(m), previous.metric(m)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::Timeframe;
    use chrono::Utc;

    #[test]
    fn test_rising_drawdown_is_a_down_trend() {
        let t = trend_for(Metric::MaxDrawdown, 0.08, 0.04);
        assert_eq!(t.direction, TrendDirection::Down);
        assert_eq!(t.arrow, "↓");
        assert!(t.delta > 0.0);
        assert!((t.delta_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rising_hit_rate_is_up() {
        let t = trend_for(Metric::HitRate, 0.70, 0.60);
        assert_eq!(t.direction, TrendDirection::Up);
        assert_eq!(t.arrow, "↑");
    }

    #[test]
    fn test_small_delta_is_flat() {
        let t = trend_for(Metric::Sharpe, 1.2005, 1.2);
        assert_eq!(t.direction, TrendDirection::Flat);
        assert_eq!(t.arrow, "→");
    }

    #[test]
    fn test_calculate_trends_covers_every_metric() {
        let prev = KpiBundle::neutral(Timeframe::FiveDay, "equities", Utc::now());
        let mut cur = prev.clone();
        cur.prediction_quality.brier_score = 0.1;
        let trends = calculate_trends(&cur, &prev);
        assert_eq!(trends.len(), Metric::ALL.len());
        assert_eq!(trends["brier_score"].direction, TrendDirection::Down);
        assert_eq!(trends["brier_score"].delta_pct, 0.0);
        assert_eq!(trends["hit_rate"].direction, TrendDirection::Flat);
    }
}
