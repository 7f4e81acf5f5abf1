//! Pure KPI → trigger evaluation.
//!
//! Each metric is classified into a good, warn or bad zone against its
//! threshold. Warn emits a LOW `ALERT`; bad keeps the `ALERT` (escalated) and
//! adds a hard trigger chosen by metric category. Two or more bad metrics add
//! a composite `THROTTLE`. Worsening any single metric can only move it to a
//! later zone with a higher or equal severity, so the trigger set only grows.

use crate::domain::kpi::bundle::KpiBundle;
use crate::domain::kpi::metric::{Metric, MetricCategory};
use crate::domain::kpi::thresholds::ThresholdTable;
use crate::domain::kpi::trigger::{Severity, Trigger, TriggerType};

const SCALE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Good,
    Warn,
    /// Relative distance past the warn band.
    Bad(f64),
}

/// Classifies one metric value against its threshold.
pub fn classify(metric: Metric, value: f64, threshold: f64, warn_band: f64) -> Zone {
    let shortfall = if metric.higher_is_better() {
        threshold - value
    } else {
        value - threshold
    };

    if shortfall <= 0.0 {
        return Zone::Good;
    }

    let band = threshold.abs() * warn_band.max(0.0);
    if shortfall <= band {
        return Zone::Warn;
    }

    let scale = if threshold.abs() > SCALE_EPSILON {
        threshold.abs()
    } else {
        1.0
    };
    Zone::Bad((shortfall - band) / scale)
}

pub fn severity_for_excess(excess: f64) -> Severity {
    if excess < 0.25 {
        Severity::Medium
    } else if excess < 0.5 {
        Severity::High
    } else {
        Severity::Critical
    }
}

/// Hard trigger raised when a metric is in the bad zone.
pub fn hard_trigger_for(metric: Metric) -> TriggerType {
    match metric.category() {
        MetricCategory::PredictionQuality => TriggerType::Retrain,
        MetricCategory::Financial => TriggerType::Throttle,
        MetricCategory::Risk => TriggerType::TightenRisk,
    }
}

/// Evaluates every configured metric of `bundle`. Deterministic: `triggered_at`
/// is the bundle's `computed_at`.
pub fn evaluate_triggers(bundle: &KpiBundle, thresholds: &ThresholdTable) -> Vec<Trigger> {
    if bundle.is_neutral() || bundle.sample_size < thresholds.min_samples {
        return Vec::new();
    }

    let scope = bundle.scope();
    let mut triggers = Vec::new();
    let mut bad: Vec<(Metric, Severity)> = Vec::new();

    for metric in Metric::ALL {
        let value = bundle.metric(metric);
        if !value.is_finite() {
            continue;
        }
        let Some(threshold) = thresholds.threshold(metric, bundle.timeframe) else {
            continue;
        };

        let comparison = if metric.higher_is_better() {
            "below"
        } else {
            "above"
        };

        match classify(metric, value, threshold, thresholds.warn_band) {
            Zone::Good => {}
            Zone::Warn => triggers.push(Trigger {
                trigger_type: TriggerType::Alert,
                scope: scope.clone(),
                metric: Some(metric),
                severity: Severity::Low,
                reason: format!(
                    "{} {:.4} approaching target {:.4} ({} {})",
                    metric, value, threshold, comparison, bundle.timeframe
                ),
                triggered_at: bundle.computed_at,
            }),
            Zone::Bad(excess) => {
                let severity = severity_for_excess(excess);
                let reason = format!(
                    "{} {:.4} {} target {:.4} for {} ({:.0}% past warn band)",
                    metric,
                    value,
                    comparison,
                    threshold,
                    bundle.timeframe,
                    excess * 100.0
                );
                triggers.push(Trigger {
                    trigger_type: TriggerType::Alert,
                    scope: scope.clone(),
                    metric: Some(metric),
                    severity,
                    reason: reason.clone(),
                    triggered_at: bundle.computed_at,
                });
                triggers.push(Trigger {
                    trigger_type: hard_trigger_for(metric),
                    scope: scope.clone(),
                    metric: Some(metric),
                    severity,
                    reason,
                    triggered_at: bundle.computed_at,
                });
                bad.push((metric, severity));
            }
        }
    }

    if bad.len() >= 2 {
        let severity = bad
            .iter()
            .map(|(_, s)| *s)
            .max()
            .unwrap_or(Severity::Medium);
        let names: Vec<&str> = bad.iter().map(|(m, _)| m.as_str()).collect();
        triggers.push(Trigger {
            trigger_type: TriggerType::Throttle,
            scope,
            metric: None,
            severity,
            reason: format!(
                "Composite degradation: {} metrics breached ({})",
                bad.len(),
                names.join(", ")
            ),
            triggered_at: bundle.computed_at,
        });
    }

    triggers
}
