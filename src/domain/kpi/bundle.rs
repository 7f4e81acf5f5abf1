use crate::domain::kpi::metric::Metric;
use crate::domain::scope::{Scope, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionQuality {
    pub hit_rate: f64,
    pub brier_score: f64,
    pub mape: f64,
    pub precision: f64,
    pub recall: f64,
    /// Mean stated confidence as a 0-1 probability.
    #[serde(default)]
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialKpis {
    pub sharpe: f64,
    pub sortino: f64,
    pub pnl_growth: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolRegime {
    Low,
    Normal,
    High,
    #[default]
    Unknown,
}

impl VolRegime {
    /// Buckets a per-period return standard deviation.
    pub fn from_volatility(volatility: f64, observations: usize) -> Self {
        if observations < 2 || !volatility.is_finite() {
            VolRegime::Unknown
        } else if volatility < 0.01 {
            VolRegime::Low
        } else if volatility < 0.025 {
            VolRegime::Normal
        } else {
            VolRegime::High
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskKpis {
    pub max_drawdown: f64,
    pub var_95: f64,
    #[serde(default)]
    pub volatility: f64,
    pub vol_regime: VolRegime,
}

/// Traffic-light summary shown next to a bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiStatus {
    Green,
    Amber,
    Red,
    #[default]
    InsufficientData,
}

/// Rolling KPIs for one (product, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiBundle {
    pub timeframe: Timeframe,
    pub product: String,
    pub prediction_quality: PredictionQuality,
    pub financial: FinancialKpis,
    pub risk: RiskKpis,
    pub sample_size: usize,
    pub computed_at: DateTime<Utc>,
    #[serde(default)]
    pub status: KpiStatus,
}

impl KpiBundle {
    /// Zero-sample bundle. Never drives triggers.
    pub fn neutral(timeframe: Timeframe, product: &str, computed_at: DateTime<Utc>) -> Self {
        Self {
            timeframe,
            product: product.to_lowercase(),
            prediction_quality: PredictionQuality::default(),
            financial: FinancialKpis::default(),
            risk: RiskKpis::default(),
            sample_size: 0,
            computed_at,
            status: KpiStatus::InsufficientData,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.sample_size == 0
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.product.as_str(), self.timeframe)
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::HitRate => self.prediction_quality.hit_rate,
            Metric::BrierScore => self.prediction_quality.brier_score,
            Metric::Mape => self.prediction_quality.mape,
            Metric::Precision => self.prediction_quality.precision,
            Metric::Recall => self.prediction_quality.recall,
            Metric::Sharpe => self.financial.sharpe,
            Metric::Sortino => self.financial.sortino,
            Metric::PnlGrowth => self.financial.pnl_growth,
            Metric::MaxDrawdown => self.risk.max_drawdown,
            Metric::Var95 => self.risk.var_95,
        }
    }

    pub fn set_metric(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::HitRate => &mut self.prediction_quality.hit_rate,
            Metric::BrierScore => &mut self.prediction_quality.brier_score,
            Metric::Mape => &mut self.prediction_quality.mape,
            Metric::Precision => &mut self.prediction_quality.precision,
            Metric::Recall => &mut self.prediction_quality.recall,
            Metric::Sharpe => &mut self.financial.sharpe,
            Metric::Sortino => &mut self.financial.sortino,
            Metric::PnlGrowth => &mut self.financial.pnl_growth,
            Metric::MaxDrawdown => &mut self.risk.max_drawdown,
            Metric::Var95 => &mut self.risk.var_95,
        };
        *slot = value;
    }

    /// Coerces every non-finite field to 0.0.
    pub fn sanitize(mut self) -> Self {
        for metric in Metric::ALL {
            let value = self.metric(metric);
            if !value.is_finite() {
                self.set_metric(metric, 0.0);
            }
        }
        for slot in [
            &mut self.prediction_quality.avg_confidence,
            &mut self.risk.volatility,
        ] {
            if !slot.is_finite() {
                *slot = 0.0;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_bundle() {
        let b = KpiBundle::neutral(Timeframe::FiveDay, "Options", Utc::now());
        assert!(b.is_neutral());
        assert_eq!(b.product, "options");
        assert_eq!(b.status, KpiStatus::InsufficientData);
        for m in Metric::ALL {
            assert_eq!(b.metric(m), 0.0);
        }
    }

    #[test]
    fn test_sanitize_coerces_non_finite() {
        let mut b = KpiBundle::neutral(Timeframe::All, "equities", Utc::now());
        b.set_metric(Metric::Sharpe, f64::NAN);
        b.set_metric(Metric::Sortino, f64::INFINITY);
        b.risk.volatility = f64::NEG_INFINITY;
        let b = b.sanitize();
        assert_eq!(b.financial.sharpe, 0.0);
        assert_eq!(b.financial.sortino, 0.0);
        assert_eq!(b.risk.volatility, 0.0);
    }

    #[test]
    fn test_vol_regime_buckets() {
        assert_eq!(VolRegime::from_volatility(0.005, 10), VolRegime::Low);
        assert_eq!(VolRegime::from_volatility(0.015, 10), VolRegime::Normal);
        assert_eq!(VolRegime::from_volatility(0.04, 10), VolRegime::High);
        assert_eq!(VolRegime::from_volatility(0.04, 1), VolRegime::Unknown);
    }
}
