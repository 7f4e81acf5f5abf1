use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rolling KPI window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "3D")]
    ThreeDay,
    #[serde(rename = "5D")]
    FiveDay,
    #[serde(rename = "10D")]
    TenDay,
    #[serde(rename = "15D")]
    FifteenDay,
    #[serde(rename = "30D")]
    ThirtyDay,
    #[serde(rename = "All")]
    All,
}

impl Timeframe {
    pub const WINDOWED: [Timeframe; 5] = [
        Timeframe::ThreeDay,
        Timeframe::FiveDay,
        Timeframe::TenDay,
        Timeframe::FifteenDay,
        Timeframe::ThirtyDay,
    ];

    pub const EVERY: [Timeframe; 6] = [
        Timeframe::ThreeDay,
        Timeframe::FiveDay,
        Timeframe::TenDay,
        Timeframe::FifteenDay,
        Timeframe::ThirtyDay,
        Timeframe::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::ThreeDay => "3D",
            Timeframe::FiveDay => "5D",
            Timeframe::TenDay => "10D",
            Timeframe::FifteenDay => "15D",
            Timeframe::ThirtyDay => "30D",
            Timeframe::All => "All",
        }
    }

    /// Window length in days, `None` for the unbounded window.
    pub fn days(&self) -> Option<i64> {
        match self {
            Timeframe::ThreeDay => Some(3),
            Timeframe::FiveDay => Some(5),
            Timeframe::TenDay => Some(10),
            Timeframe::FifteenDay => Some(15),
            Timeframe::ThirtyDay => Some(30),
            Timeframe::All => None,
        }
    }

    /// Oldest timestamp still inside the window ending at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days().map(|d| now - Duration::days(d))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "3D" => Ok(Timeframe::ThreeDay),
            "5D" => Ok(Timeframe::FiveDay),
            "10D" => Ok(Timeframe::TenDay),
            "15D" => Ok(Timeframe::FifteenDay),
            "30D" => Ok(Timeframe::ThirtyDay),
            "ALL" => Ok(Timeframe::All),
            _ => anyhow::bail!(
                "Invalid timeframe: {}. Must be one of 3D, 5D, 10D, 15D, 30D, All",
                s
            ),
        }
    }
}

/// Product that matches every record.
pub const ALL_PRODUCTS: &str = "all";

/// (product, timeframe[, symbol]) tuple keying KPI bundles, cooldowns and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub product: String,
    pub timeframe: Timeframe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Scope {
    pub fn new(product: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            product: product.into().trim().to_lowercase(),
            timeframe,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Stable storage key, e.g. `equities:5D` or `equities:5D:RELIANCE`.
    pub fn key(&self) -> String {
        match &self.symbol {
            Some(symbol) => format!("{}:{}:{}", self.product, self.timeframe, symbol),
            None => format!("{}:{}", self.product, self.timeframe),
        }
    }

    pub fn matches_product(&self, product: &str) -> bool {
        self.product == ALL_PRODUCTS || self.product.eq_ignore_ascii_case(product)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse_is_case_insensitive() {
        assert_eq!("5d".parse::<Timeframe>().unwrap(), Timeframe::FiveDay);
        assert_eq!(" all ".parse::<Timeframe>().unwrap(), Timeframe::All);
        assert!("7D".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_cutoff() {
        let now = Utc::now();
        assert_eq!(Timeframe::All.cutoff(now), None);
        assert_eq!(
            Timeframe::TenDay.cutoff(now),
            Some(now - Duration::days(10))
        );
    }

    #[test]
    fn test_scope_key() {
        let scope = Scope::new("Equities", Timeframe::FiveDay);
        assert_eq!(scope.key(), "equities:5D");
        assert_eq!(scope.with_symbol("TCS").key(), "equities:5D:TCS");
    }

    #[test]
    fn test_timeframe_serde_uses_labels() {
        let json = serde_json::to_string(&Timeframe::FifteenDay).unwrap();
        assert_eq!(json, "\"15D\"");
    }
}
