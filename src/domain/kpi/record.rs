use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

/// One prediction and, once known, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub product: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Stated confidence, 0-100.
    pub confidence: f64,
    pub predicted_direction: Direction,
    /// `None` while the outcome is still pending.
    #[serde(default)]
    pub actual_direction: Option<Direction>,
    #[serde(default)]
    pub predicted_return: Option<f64>,
    #[serde(default)]
    pub actual_return: Option<f64>,
    /// Return realized by acting on the prediction.
    #[serde(default)]
    pub realized_return: Option<f64>,
}

impl PredictionRecord {
    pub fn is_resolved(&self) -> bool {
        self.actual_direction.is_some()
    }

    pub fn is_correct(&self) -> bool {
        self.actual_direction == Some(self.predicted_direction)
    }
}
