use chrono::{Duration, Utc};
use goahead::application::kpi::KpiService;
use goahead::domain::kpi::policy::evaluate_triggers;
use goahead::domain::kpi::{
    Direction, KpiBundle, KpiStatus, Metric, PredictionRecord, ThresholdTable, TrendDirection,
    Trigger, TriggerType,
};
use goahead::domain::scope::Timeframe;
use goahead::infrastructure::persistence::{InMemoryKeyValueStore, InMemoryPredictionSource};
use std::sync::Arc;

fn healthy_bundle() -> KpiBundle {
    let mut bundle = KpiBundle::neutral(Timeframe::FiveDay, "equities", Utc::now());
    bundle.sample_size = 50;
    for (metric, value) in [
        (Metric::HitRate, 0.72),
        (Metric::BrierScore, 0.12),
        (Metric::Mape, 0.10),
        (Metric::Precision, 0.70),
        (Metric::Recall, 0.68),
        (Metric::Sharpe, 1.8),
        (Metric::Sortino, 2.6),
        (Metric::PnlGrowth, 0.04),
        (Metric::MaxDrawdown, 0.02),
        (Metric::Var95, 0.002),
    ] {
        bundle.set_metric(metric, value);
    }
    bundle
}

fn identities(triggers: &[Trigger]) -> Vec<(TriggerType, String, Option<Metric>)> {
    triggers.iter().map(Trigger::identity).collect()
}

#[test]
fn test_healthy_bundle_raises_nothing() {
    let triggers = evaluate_triggers(&healthy_bundle(), &ThresholdTable::default());
    assert!(triggers.is_empty(), "unexpected triggers: {:?}", triggers);
}

#[test]
fn test_zero_samples_never_trigger() {
    let mut bundle = healthy_bundle();
    for metric in Metric::ALL {
        bundle.set_metric(metric, if metric.higher_is_better() { -5.0 } else { 5.0 });
    }
    bundle.sample_size = 0;
    assert!(evaluate_triggers(&bundle, &ThresholdTable::default()).is_empty());
}

#[test]
fn test_worsening_a_metric_only_adds_triggers() {
    let thresholds = ThresholdTable::default();
    let mut previous = identities(&evaluate_triggers(&healthy_bundle(), &thresholds));

    // Good, warn band, just past the band, far past it
    for hit_rate in [0.70, 0.60, 0.54, 0.30, 0.05] {
        let mut bundle = healthy_bundle();
        bundle.set_metric(Metric::HitRate, hit_rate);
        let current = identities(&evaluate_triggers(&bundle, &thresholds));
        for identity in &previous {
            assert!(
                current.contains(identity),
                "hit_rate {} dropped {:?}",
                hit_rate,
                identity
            );
        }
        previous = current;
    }
    assert!(
        previous
            .iter()
            .any(|(t, _, m)| *t == TriggerType::Retrain && *m == Some(Metric::HitRate))
    );
}

#[test]
fn test_lower_is_better_metrics_mirror_the_comparison() {
    let thresholds = ThresholdTable::default();
    let mut bundle = healthy_bundle();
    bundle.set_metric(Metric::MaxDrawdown, 0.20);
    let triggers = evaluate_triggers(&bundle, &thresholds);
    assert!(triggers.iter().any(|t| t.trigger_type == TriggerType::TightenRisk
        && t.metric == Some(Metric::MaxDrawdown)));

    bundle.set_metric(Metric::MaxDrawdown, 0.0);
    assert!(evaluate_triggers(&bundle, &thresholds).is_empty());
}

#[test]
fn test_two_breaches_add_composite_throttle() {
    let mut bundle = healthy_bundle();
    bundle.set_metric(Metric::HitRate, 0.30);
    bundle.set_metric(Metric::Var95, 0.05);
    let triggers = evaluate_triggers(&bundle, &ThresholdTable::default());
    assert!(
        triggers
            .iter()
            .any(|t| t.trigger_type == TriggerType::Throttle && t.metric.is_none())
    );
}

fn record(i: i64, correct: bool, realized: f64) -> PredictionRecord {
    PredictionRecord {
        product: "equities".to_string(),
        symbol: format!("SYM{}", i % 5),
        timestamp: Utc::now() - Duration::hours(i + 1),
        confidence: 80.0,
        predicted_direction: Direction::Buy,
        actual_direction: Some(if correct { Direction::Buy } else { Direction::Sell }),
        predicted_return: Some(0.01),
        actual_return: Some(realized),
        realized_return: Some(realized),
    }
}

#[tokio::test]
async fn test_service_flags_a_losing_book() {
    let records = (0..30).map(|i| record(i, i % 4 == 0, -0.015)).collect();
    let source = Arc::new(InMemoryPredictionSource::new(records));
    let service = KpiService::new(
        source,
        Arc::new(InMemoryKeyValueStore::new()),
        ThresholdTable::default(),
    );

    let report = service.report(Timeframe::FiveDay, "Equities").await;
    assert_eq!(report.bundle.product, "equities");
    assert_eq!(report.bundle.sample_size, 30);
    assert!(report.bundle.prediction_quality.hit_rate < 0.3);
    assert_ne!(report.bundle.status, KpiStatus::InsufficientData);
    assert!(report.trends.is_none());
    assert!(
        report
            .triggers
            .iter()
            .any(|t| t.trigger_type == TriggerType::Retrain)
    );
}

#[tokio::test]
async fn test_service_history_drives_trends() {
    let source = Arc::new(InMemoryPredictionSource::new(
        (0..30).map(|i| record(i, true, 0.01)).collect(),
    ));
    let service = KpiService::new(
        source.clone(),
        Arc::new(InMemoryKeyValueStore::new()),
        ThresholdTable::default(),
    )
    .with_history_len(3);

    service.compute(Timeframe::FiveDay, "equities").await;
    source
        .set_records((0..30).map(|i| record(i, i % 2 == 0, -0.01)).collect())
        .await;
    let report = service.report(Timeframe::FiveDay, "equities").await;

    let trends = report.trends.expect("second snapshot should have trends");
    assert_eq!(trends["hit_rate"].direction, TrendDirection::Down);

    for _ in 0..5 {
        service.compute(Timeframe::FiveDay, "equities").await;
    }
    assert_eq!(service.history(Timeframe::FiveDay, "equities").await.len(), 3);
}

#[tokio::test]
async fn test_empty_source_yields_neutral_bundle() {
    let service = KpiService::new(
        Arc::new(InMemoryPredictionSource::default()),
        Arc::new(InMemoryKeyValueStore::new()),
        ThresholdTable::default(),
    );
    let bundle = service.get_kpis(None, None).await;
    assert!(bundle.is_neutral());
    assert_eq!(bundle.timeframe, Timeframe::All);
    assert!(service.evaluate_triggers(&bundle).is_empty());
}
