//! Aggregates prediction records into a `KpiBundle`.

use crate::domain::kpi::{
    Direction, FinancialKpis, KpiBundle, PredictionQuality, PredictionRecord, RiskKpis, VolRegime,
};
use crate::domain::scope::{ALL_PRODUCTS, Timeframe};
use chrono::{DateTime, Utc};
use statrs::statistics::{Data, Distribution, OrderStatistics};

/// Trading periods per year used to annualize Sharpe/Sortino.
const PERIODS_PER_YEAR: f64 = 252.0;
/// Historical VaR needs at least this many returns.
const MIN_VAR_SAMPLES: usize = 20;
/// Per-record cap on absolute percentage error.
const MAPE_CAP: f64 = 1.0;

/// Records inside the timeframe window ending at `now` for `product`.
pub fn filter_records<'a>(
    records: &'a [PredictionRecord],
    timeframe: Timeframe,
    product: &str,
    now: DateTime<Utc>,
) -> Vec<&'a PredictionRecord> {
    let cutoff = timeframe.cutoff(now);
    let all_products = product.eq_ignore_ascii_case(ALL_PRODUCTS);
    records
        .iter()
        .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
        .filter(|r| all_products || r.product.eq_ignore_ascii_case(product))
        .collect()
}

/// Builds the bundle for one scope. Only resolved records count toward
/// `sample_size`; with none the neutral bundle is returned.
pub fn aggregate(
    records: &[PredictionRecord],
    timeframe: Timeframe,
    product: &str,
    now: DateTime<Utc>,
) -> KpiBundle {
    let scoped = filter_records(records, timeframe, product, now);
    let resolved: Vec<&PredictionRecord> = scoped.into_iter().filter(|r| r.is_resolved()).collect();

    if resolved.is_empty() {
        return KpiBundle::neutral(timeframe, product, now);
    }

    let returns: Vec<f64> = resolved
        .iter()
        .filter_map(|r| r.realized_return)
        .filter(|r| r.is_finite())
        .collect();

    let mut bundle = KpiBundle::neutral(timeframe, product, now);
    bundle.sample_size = resolved.len();
    bundle.prediction_quality = prediction_quality(&resolved);
    bundle.financial = financial(&returns);
    bundle.risk = risk(&returns);
    bundle.sanitize()
}

fn prediction_quality(resolved: &[&PredictionRecord]) -> PredictionQuality {
    let n = resolved.len() as f64;
    let correct = resolved.iter().filter(|r| r.is_correct()).count() as f64;
    let hit_rate = correct / n;

    let brier = mean(
        resolved
            .iter()
            .filter(|r| r.predicted_direction != Direction::Hold)
            .map(|r| {
                let p = (r.confidence / 100.0).clamp(0.0, 1.0);
                let outcome = if r.is_correct() { 1.0 } else { 0.0 };
                (p - outcome).powi(2)
            }),
    )
    .unwrap_or(0.0);

    let predicted_buy = resolved
        .iter()
        .filter(|r| r.predicted_direction == Direction::Buy)
        .count();
    let actual_buy = resolved
        .iter()
        .filter(|r| r.actual_direction == Some(Direction::Buy))
        .count();
    let true_buy = resolved
        .iter()
        .filter(|r| r.predicted_direction == Direction::Buy && r.is_correct())
        .count();
    // Undefined ratios fall back to the hit rate rather than reading as a breach
    let precision = ratio(true_buy, predicted_buy).unwrap_or(hit_rate);
    let recall = ratio(true_buy, actual_buy).unwrap_or(hit_rate);

    let mape = mean(resolved.iter().filter_map(|r| {
        let (predicted, actual) = (r.predicted_return?, r.actual_return?);
        (actual.abs() > f64::EPSILON && predicted.is_finite() && actual.is_finite())
            .then(|| ((actual - predicted) / actual).abs().min(MAPE_CAP))
    }))
    .unwrap_or(0.0);

    let avg_confidence =
        mean(resolved.iter().map(|r| (r.confidence / 100.0).clamp(0.0, 1.0))).unwrap_or(0.0);

    PredictionQuality {
        hit_rate,
        brier_score: brier,
        mape,
        precision,
        recall,
        avg_confidence,
    }
}

fn financial(returns: &[f64]) -> FinancialKpis {
    if returns.is_empty() {
        return FinancialKpis::default();
    }

    let data = Data::new(returns.to_vec());
    let avg = data.mean().unwrap_or(0.0);
    let std_dev = data.std_dev().unwrap_or(0.0);

    let sharpe = if std_dev > 0.0 {
        avg / std_dev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sortino = if downside.is_empty() {
        // No losing periods: downside deviation is undefined
        sharpe
    } else {
        let downside_dev = (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
        if downside_dev > 0.0 {
            avg / downside_dev * PERIODS_PER_YEAR.sqrt()
        } else {
            0.0
        }
    };

    let pnl_growth = returns.iter().fold(1.0, |equity, r| equity * (1.0 + r)) - 1.0;

    FinancialKpis {
        sharpe,
        sortino,
        pnl_growth,
    }
}

fn risk(returns: &[f64]) -> RiskKpis {
    if returns.is_empty() {
        return RiskKpis::default();
    }

    let mut peak = 1.0_f64;
    let mut equity = 1.0_f64;
    let mut max_drawdown = 0.0_f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }

    let mut data = Data::new(returns.to_vec());
    let volatility = data.std_dev().unwrap_or(0.0);
    let var_95 = if returns.len() >= MIN_VAR_SAMPLES {
        (-data.percentile(5)).max(0.0)
    } else {
        0.0
    };

    RiskKpis {
        max_drawdown,
        var_95,
        volatility,
        vol_regime: VolRegime::from_volatility(volatility, returns.len()),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(
        product: &str,
        age_days: i64,
        predicted: Direction,
        actual: Option<Direction>,
        confidence: f64,
        realized: Option<f64>,
        now: DateTime<Utc>,
    ) -> PredictionRecord {
        PredictionRecord {
            product: product.to_string(),
            symbol: "TEST".to_string(),
            timestamp: now - Duration::days(age_days),
            confidence,
            predicted_direction: predicted,
            actual_direction: actual,
            predicted_return: None,
            actual_return: None,
            realized_return: realized,
        }
    }

    #[test]
    fn test_no_records_yields_neutral_bundle() {
        let now = Utc::now();
        let b = aggregate(&[], Timeframe::FiveDay, "equities", now);
        assert!(b.is_neutral());
    }

    #[test]
    fn test_unresolved_records_are_ignored() {
        let now = Utc::now();
        let records = vec![record("equities", 1, Direction::Buy, None, 80.0, None, now)];
        assert!(aggregate(&records, Timeframe::FiveDay, "equities", now).is_neutral());
    }

    #[test]
    fn test_window_and_product_filtering() {
        let now = Utc::now();
        let records = vec![
            record("equities", 1, Direction::Buy, Some(Direction::Buy), 80.0, None, now),
            record("equities", 10, Direction::Buy, Some(Direction::Sell), 80.0, None, now),
            record("options", 1, Direction::Sell, Some(Direction::Sell), 70.0, None, now),
        ];
        assert_eq!(aggregate(&records, Timeframe::FiveDay, "equities", now).sample_size, 1);
        assert_eq!(aggregate(&records, Timeframe::All, "equities", now).sample_size, 2);
        assert_eq!(aggregate(&records, Timeframe::FiveDay, "all", now).sample_size, 2);
    }

    #[test]
    fn test_prediction_quality() {
        let now = Utc::now();
        let records = vec![
            record("equities", 1, Direction::Buy, Some(Direction::Buy), 80.0, None, now),
            record("equities", 1, Direction::Buy, Some(Direction::Sell), 60.0, None, now),
            record("equities", 1, Direction::Sell, Some(Direction::Sell), 70.0, None, now),
            record("equities", 1, Direction::Sell, Some(Direction::Buy), 90.0, None, now),
        ];
        let q = aggregate(&records, Timeframe::FiveDay, "equities", now).prediction_quality;
        assert!((q.hit_rate - 0.5).abs() < 1e-9);
        // (0.2² + 0.6² + 0.3² + 0.9²) / 4
        assert!((q.brier_score - (0.04 + 0.36 + 0.09 + 0.81) / 4.0).abs() < 1e-9);
        assert!((q.precision - 0.5).abs() < 1e-9);
        assert!((q.recall - 0.5).abs() < 1e-9);
        assert!((q.avg_confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_and_growth() {
        let returns = [0.10, -0.20, 0.05];
        let r = risk(&returns);
        // Peak 1.1, trough 0.88
        assert!((r.max_drawdown - 0.2).abs() < 1e-9);
        let f = financial(&returns);
        assert!((f.pnl_growth - (1.1 * 0.8 * 1.05 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_var_requires_enough_samples() {
        let few = [-0.05; 5];
        assert_eq!(risk(&few).var_95, 0.0);

        let mut many: Vec<f64> = (0..19).map(|_| 0.01).collect();
        many.push(-0.08);
        assert!(risk(&many).var_95 > 0.0);
    }
}
