//! Request-facing facade over the orchestrator.
//!
//! Every call returns either an [`ApiResponse`] or an [`ApiError`] carrying
//! the shared `{success: false, error, code, timestamp}` shape and an
//! HTTP-equivalent status for the transport layer.

use crate::application::kpi::KpiReport;
use crate::application::orchestrator::trainer::recent_decisions;
use crate::application::orchestrator::{
    Orchestrator, OrchestratorMetrics, TrainerOutcome, TrainerScopeStatus,
};
use crate::domain::agents::{AgentInput, AgentOutput, AgentStatus};
use crate::domain::errors::AgentError;
use crate::domain::kpi::KpiBundle;
use crate::domain::run_record::{RunRecord, TrainerDecision};
use crate::domain::scope::{ALL_PRODUCTS, Timeframe};
use crate::infrastructure::feature_flags::InMemoryFeatureFlags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Rate-limit family of manual KPI recomputes. Each (scope, timeframe,
/// product) gets its own window under this limit.
pub const RECOMPUTE_RATE_KEY: &str = "kpi_recompute";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub const MAX_HISTORY_LIMIT: usize = 1000;

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip)]
    pub status: u16,
    pub timestamp: String,
}

impl ApiError {
    pub fn at(error: &AgentError, now: DateTime<Utc>) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            code: error.code().to_string(),
            status: error.status(),
            timestamp: format_timestamp(now),
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

impl From<AgentError> for ApiError {
    fn from(error: AgentError) -> Self {
        Self::at(&error, Utc::now())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.error)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: format_timestamp(Utc::now()),
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// What a manual recompute covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "product")]
pub enum RecomputeScope {
    /// All products together plus each configured product on its own.
    Overall,
    Product(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeResult {
    pub scope: RecomputeScope,
    pub timeframe: Timeframe,
    pub overall: Option<KpiReport>,
    pub by_product: BTreeMap<String, KpiReport>,
    pub recomputed_at: String,
}

pub struct AgentApi {
    orchestrator: Arc<Orchestrator>,
    feature_flags: Arc<InMemoryFeatureFlags>,
}

impl AgentApi {
    pub fn new(orchestrator: Arc<Orchestrator>, feature_flags: Arc<InMemoryFeatureFlags>) -> Self {
        Self {
            orchestrator,
            feature_flags,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn list_agents(&self) -> ApiResult<Vec<AgentStatus>> {
        Ok(ApiResponse::ok(
            self.orchestrator.registry().list_agents().await,
        ))
    }

    /// Manual run. A run that executed but failed maps to an execution error.
    pub async fn run_agent(&self, key: &str, input: AgentInput, force: bool) -> ApiResult<AgentOutput> {
        let output = self
            .orchestrator
            .run_agent(key, &input, force)
            .await
            .map_err(reject)?;
        let output = output.into_result().map_err(reject)?;
        Ok(ApiResponse::ok(output))
    }

    pub async fn enable_agent(&self, key: &str) -> ApiResult<AgentStatus> {
        self.set_enabled(key, true).await
    }

    pub async fn disable_agent(&self, key: &str) -> ApiResult<AgentStatus> {
        self.set_enabled(key, false).await
    }

    async fn set_enabled(&self, key: &str, enabled: bool) -> ApiResult<AgentStatus> {
        let registry = self.orchestrator.registry();
        let changed = registry.set_enabled(key, enabled).await.map_err(reject)?;
        if changed {
            info!("AgentApi: Agent '{}' enabled={}", key, enabled);
        }
        if let Some(metrics) = self.orchestrator.prometheus() {
            metrics.set_agent_enabled(key, enabled);
        }
        self.status(key).await
    }

    async fn status(&self, key: &str) -> ApiResult<AgentStatus> {
        self.orchestrator
            .registry()
            .list_agents()
            .await
            .into_iter()
            .find(|s| s.descriptor.key == key)
            .map(ApiResponse::ok)
            .ok_or_else(|| {
                reject(AgentError::AgentNotFound {
                    key: key.to_string(),
                })
            })
    }

    /// Newest runs first, at most `limit`.
    pub async fn get_history(&self, key: &str, limit: usize) -> ApiResult<Vec<RunRecord>> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(reject(AgentError::Validation {
                reason: format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT),
            }));
        }
        if !self.orchestrator.registry().contains(key).await {
            return Err(reject(AgentError::AgentNotFound {
                key: key.to_string(),
            }));
        }
        let history = self.orchestrator.outputs().load_history(key, limit).await;
        Ok(ApiResponse::ok(history))
    }

    /// Latest bundle for the scope; both default to the whole book.
    pub async fn get_kpis(&self, timeframe: Option<&str>, product: Option<&str>) -> ApiResult<KpiBundle> {
        let timeframe = timeframe.map(parse_timeframe).transpose()?;
        let bundle = self.orchestrator.kpi().get_kpis(timeframe, product).await;
        Ok(ApiResponse::ok(bundle))
    }

    pub async fn recompute_kpis(&self, scope: RecomputeScope, timeframe: &str) -> ApiResult<RecomputeResult> {
        let timeframe = parse_timeframe(timeframe)?;
        if let RecomputeScope::Product(product) = &scope
            && product.trim().is_empty()
        {
            return Err(reject(AgentError::Validation {
                reason: "product scope requires a product".to_string(),
            }));
        }

        let now = Utc::now();
        let rate_key = recompute_rate_key(&scope, timeframe);
        let limiter = self.orchestrator.rate_limiter();
        if !limiter.is_allowed_at(&rate_key, now).await {
            return Err(reject(AgentError::RateLimitExceeded {
                retry_after_secs: limiter.retry_after_secs(&rate_key, now).await,
                key: rate_key,
            }));
        }

        let kpi = self.orchestrator.kpi();
        let mut by_product = BTreeMap::new();
        let overall = match &scope {
            RecomputeScope::Overall => {
                for product in &self.orchestrator.config().products {
                    if product != ALL_PRODUCTS {
                        by_product.insert(product.clone(), kpi.report(timeframe, product).await);
                    }
                }
                Some(kpi.report(timeframe, ALL_PRODUCTS).await)
            }
            RecomputeScope::Product(product) => {
                let product = product.trim().to_lowercase();
                let report = kpi.report(timeframe, &product).await;
                by_product.insert(product, report);
                None
            }
        };

        info!("AgentApi: KPIs recomputed for {:?} {}", scope, timeframe);
        Ok(ApiResponse::ok(RecomputeResult {
            scope,
            timeframe,
            overall,
            by_product,
            recomputed_at: format_timestamp(now),
        }))
    }

    pub async fn get_orchestrator_metrics(&self) -> ApiResult<OrchestratorMetrics> {
        Ok(ApiResponse::ok(self.orchestrator.get_metrics().await))
    }

    pub async fn run_trainer(&self, product: &str, timeframe: &str, force: bool) -> ApiResult<TrainerOutcome> {
        let timeframe = parse_timeframe(timeframe)?;
        let outcome = self
            .orchestrator
            .run_trainer(product, timeframe, force)
            .await
            .map_err(reject)?;
        Ok(ApiResponse::ok(outcome))
    }

    pub async fn trainer_decisions(&self, limit: usize) -> ApiResult<Vec<TrainerDecision>> {
        let decisions = recent_decisions(self.orchestrator.store().as_ref(), limit).await;
        Ok(ApiResponse::ok(decisions))
    }

    /// Retrain and cooldown state per timeframe; all configured products
    /// when `product` is `None`.
    pub async fn trainer_status(&self, product: Option<&str>) -> ApiResult<Vec<TrainerScopeStatus>> {
        if product.is_some_and(|p| p.trim().is_empty()) {
            return Err(reject(AgentError::Validation {
                reason: "product must not be empty".to_string(),
            }));
        }
        Ok(ApiResponse::ok(self.orchestrator.trainer_status(product).await))
    }

    pub fn feature_flags(&self) -> ApiResponse<HashMap<String, bool>> {
        ApiResponse::ok(self.feature_flags.snapshot())
    }

    pub fn set_feature_flag(&self, flag: &str, enabled: bool) -> ApiResult<bool> {
        if flag.trim().is_empty() {
            return Err(reject(AgentError::Validation {
                reason: "flag name must not be empty".to_string(),
            }));
        }
        self.feature_flags.set(flag.trim(), enabled);
        Ok(ApiResponse::ok(enabled))
    }
}

pub fn recompute_rate_key(scope: &RecomputeScope, timeframe: Timeframe) -> String {
    match scope {
        RecomputeScope::Overall => {
            format!("{}:overall:{}:{}", RECOMPUTE_RATE_KEY, timeframe, ALL_PRODUCTS)
        }
        RecomputeScope::Product(product) => format!(
            "{}:product:{}:{}",
            RECOMPUTE_RATE_KEY,
            timeframe,
            product.trim().to_lowercase()
        ),
    }
}

fn parse_timeframe(raw: &str) -> Result<Timeframe, ApiError> {
    raw.parse::<Timeframe>().map_err(|e| {
        reject(AgentError::Validation {
            reason: e.to_string(),
        })
    })
}

fn reject(error: AgentError) -> ApiError {
    if error.is_guard_rejection() || error.status() < 500 {
        info!("AgentApi: Request rejected: {}", error);
    } else {
        warn!("AgentApi: Request failed: {}", error);
    }
    ApiError::from(error)
}
