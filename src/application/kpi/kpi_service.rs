use crate::application::kpi::calculator;
use crate::domain::kpi::policy;
use crate::domain::kpi::{KpiBundle, KpiStatus, Severity, ThresholdTable, TrendPoint, Trigger, trend};
use crate::domain::ports::{KeyValueStore, PredictionSource, load_or_default, save_json};
use crate::domain::run_record::append_capped;
use crate::domain::scope::{ALL_PRODUCTS, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_HISTORY_LEN: usize = 10;

/// Bundle together with its trends against the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    pub bundle: KpiBundle,
    pub trends: Option<BTreeMap<String, TrendPoint>>,
    pub triggers: Vec<Trigger>,
}

/// Computes KPI bundles, evaluates triggers and tracks a short KPI history
/// per scope for trend reporting.
pub struct KpiService {
    source: Arc<dyn PredictionSource>,
    store: Arc<dyn KeyValueStore>,
    thresholds: ThresholdTable,
    history_len: usize,
    history_lock: Mutex<()>,
}

impl KpiService {
    pub fn new(
        source: Arc<dyn PredictionSource>,
        store: Arc<dyn KeyValueStore>,
        thresholds: ThresholdTable,
    ) -> Self {
        Self {
            source,
            store,
            thresholds,
            history_len: DEFAULT_HISTORY_LEN,
            history_lock: Mutex::new(()),
        }
    }

    pub fn with_history_len(mut self, history_len: usize) -> Self {
        self.history_len = history_len.max(2);
        self
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    pub async fn compute(&self, timeframe: Timeframe, product: &str) -> KpiBundle {
        self.compute_at(timeframe, product, Utc::now()).await
    }

    /// Never fails: a source fault yields the neutral bundle. The result is
    /// appended to the scope's KPI history.
    pub async fn compute_at(&self, timeframe: Timeframe, product: &str, now: DateTime<Utc>) -> KpiBundle {
        let product = normalize_product(product);
        info!(
            "KpiService: Computing KPIs for timeframe={}, product={}",
            timeframe, product
        );

        let records = match self.source.load_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!("KpiService: Failed to load prediction records: {:#}", e);
                Vec::new()
            }
        };

        let mut bundle = calculator::aggregate(&records, timeframe, &product, now);
        bundle.status = self.status_for(&bundle);

        self.append_history(&bundle).await;
        debug!(
            "KpiService: {} {} sample_size={} status={:?}",
            product, timeframe, bundle.sample_size, bundle.status
        );
        bundle
    }

    /// Pure evaluation against the configured threshold table.
    pub fn evaluate_triggers(&self, bundle: &KpiBundle) -> Vec<Trigger> {
        policy::evaluate_triggers(bundle, &self.thresholds)
    }

    pub fn calculate_trends(
        &self,
        current: &KpiBundle,
        previous: &KpiBundle,
    ) -> BTreeMap<String, TrendPoint> {
        trend::calculate_trends(current, previous)
    }

    /// Stored snapshots for a scope, oldest first.
    pub async fn history(&self, timeframe: Timeframe, product: &str) -> Vec<KpiBundle> {
        load_or_default(
            self.store.as_ref(),
            &history_key(timeframe, &normalize_product(product)),
        )
        .await
    }

    /// Snapshot preceding the latest one, if any.
    pub async fn previous_bundle(&self, timeframe: Timeframe, product: &str) -> Option<KpiBundle> {
        let history = self.history(timeframe, product).await;
        history.len().checked_sub(2).map(|i| history[i].clone())
    }

    /// Latest stored bundle, computing one when the scope has no history.
    pub async fn get_kpis(&self, timeframe: Option<Timeframe>, product: Option<&str>) -> KpiBundle {
        let timeframe = timeframe.unwrap_or(Timeframe::All);
        let product = product.unwrap_or(ALL_PRODUCTS);
        match self.history(timeframe, product).await.pop() {
            Some(latest) => latest,
            None => self.compute(timeframe, product).await,
        }
    }

    /// Fresh compute plus trends and triggers.
    pub async fn report(&self, timeframe: Timeframe, product: &str) -> KpiReport {
        let bundle = self.compute(timeframe, product).await;
        let trends = self
            .previous_bundle(timeframe, product)
            .await
            .map(|previous| self.calculate_trends(&bundle, &previous));
        let triggers = self.evaluate_triggers(&bundle);
        KpiReport {
            bundle,
            trends,
            triggers,
        }
    }

    fn status_for(&self, bundle: &KpiBundle) -> KpiStatus {
        if bundle.is_neutral() || bundle.sample_size < self.thresholds.min_samples {
            return KpiStatus::InsufficientData;
        }
        match policy::evaluate_triggers(bundle, &self.thresholds)
            .iter()
            .map(|t| t.severity)
            .max()
        {
            None => KpiStatus::Green,
            Some(Severity::Low) => KpiStatus::Amber,
            Some(_) => KpiStatus::Red,
        }
    }

    async fn append_history(&self, bundle: &KpiBundle) {
        let key = history_key(bundle.timeframe, &bundle.product);
        let _guard = self.history_lock.lock().await;
        let mut history: Vec<KpiBundle> = load_or_default(self.store.as_ref(), &key).await;
        append_capped(&mut history, bundle.clone(), self.history_len);
        save_json(self.store.as_ref(), &key, &history).await;
    }
}

fn normalize_product(product: &str) -> String {
    let trimmed = product.trim();
    if trimmed.is_empty() {
        ALL_PRODUCTS.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

fn history_key(timeframe: Timeframe, product: &str) -> String {
    format!("kpi/history/{}/{}", timeframe, product)
}
