//! Canonical verdict scale and the normalizer that maps every agent's
//! vocabulary onto it.
//!
//! Lookup order: agent-specific table, global table, fuzzy polarity tokens,
//! then `HOLD`. Tables are flattened at construction time, so when a key is
//! defined more than once the last definition wins (`NEUTRAL` appears in both
//! the options and sentiment sections).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalVerdict {
    Avoid,
    Cautious,
    Hold,
    Buy,
    StrongBuy,
}

impl CanonicalVerdict {
    pub const ALL: [CanonicalVerdict; 5] = [
        CanonicalVerdict::StrongBuy,
        CanonicalVerdict::Buy,
        CanonicalVerdict::Hold,
        CanonicalVerdict::Cautious,
        CanonicalVerdict::Avoid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalVerdict::StrongBuy => "STRONG_BUY",
            CanonicalVerdict::Buy => "BUY",
            CanonicalVerdict::Hold => "HOLD",
            CanonicalVerdict::Cautious => "CAUTIOUS",
            CanonicalVerdict::Avoid => "AVOID",
        }
    }

    /// Ordinal from -2 (AVOID) to +2 (STRONG_BUY).
    pub fn score(&self) -> i8 {
        match self {
            CanonicalVerdict::StrongBuy => 2,
            CanonicalVerdict::Buy => 1,
            CanonicalVerdict::Hold => 0,
            CanonicalVerdict::Cautious => -1,
            CanonicalVerdict::Avoid => -2,
        }
    }

    /// CSS badge class used by dashboards.
    pub fn badge_class(&self) -> &'static str {
        match self {
            CanonicalVerdict::StrongBuy => "badge-success",
            CanonicalVerdict::Buy => "badge-primary",
            CanonicalVerdict::Hold => "badge-secondary",
            CanonicalVerdict::Cautious => "badge-warning",
            CanonicalVerdict::Avoid => "badge-danger",
        }
    }
}

impl fmt::Display for CanonicalVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalVerdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STRONG_BUY" => Ok(CanonicalVerdict::StrongBuy),
            "BUY" => Ok(CanonicalVerdict::Buy),
            "HOLD" => Ok(CanonicalVerdict::Hold),
            "CAUTIOUS" => Ok(CanonicalVerdict::Cautious),
            "AVOID" => Ok(CanonicalVerdict::Avoid),
            _ => anyhow::bail!("Invalid canonical verdict: {}", s),
        }
    }
}

use CanonicalVerdict::{Avoid, Buy, Cautious, Hold, StrongBuy};

/// Shared vocabulary, in definition order.
const GLOBAL_VOCABULARY: &[(&str, CanonicalVerdict)] = &[
    // equity
    ("STRONG_BUY", StrongBuy),
    ("BUY", Buy),
    ("HOLD", Hold),
    ("SELL", Cautious),
    ("STRONG_SELL", Avoid),
    // options
    ("EXECUTE", StrongBuy),
    ("FAVORABLE", Buy),
    ("NEUTRAL", Hold),
    ("CAUTION", Cautious),
    ("AVOID", Avoid),
    // sentiment
    ("VERY_BULLISH", StrongBuy),
    ("BULLISH", Buy),
    ("NEUTRAL", Hold),
    ("BEARISH", Cautious),
    ("VERY_BEARISH", Avoid),
    // comm
    ("HIGH_CONFIDENCE", StrongBuy),
    ("CONFIDENT", Buy),
    ("MODERATE", Hold),
    ("LOW_CONFIDENCE", Cautious),
    ("NO_CONFIDENCE", Avoid),
    // trainer
    ("RETRAIN_SUCCESS", Buy),
    ("RETRAIN_NEEDED", Cautious),
    ("MODEL_STABLE", Hold),
    ("MODEL_DRIFT", Cautious),
    // dev
    ("APPROVED", Buy),
    ("NEEDS_REVIEW", Cautious),
    ("STABLE", Hold),
    // new
    ("INNOVATIVE", StrongBuy),
    ("PROMISING", Buy),
    ("EXPERIMENTAL", Cautious),
    // generic
    ("POSITIVE", Buy),
    ("NEGATIVE", Cautious),
    ("UNKNOWN", Hold),
    ("ERROR", Hold),
];

const AGENT_VOCABULARIES: &[(&str, &[(&str, CanonicalVerdict)])] = &[
    (
        "equity_agent",
        &[("UP_TREND", Buy), ("DOWN_TREND", Cautious), ("SIDEWAYS", Hold)],
    ),
    (
        "options_agent",
        &[
            ("PROFITABLE", StrongBuy),
            ("BREAKEVEN", Hold),
            ("LOSS_RISK", Avoid),
        ],
    ),
    (
        "sentiment_agent",
        &[
            ("STRONG_POSITIVE", StrongBuy),
            ("WEAK_POSITIVE", Buy),
            ("MIXED", Hold),
            ("WEAK_NEGATIVE", Cautious),
            ("STRONG_NEGATIVE", Avoid),
        ],
    ),
];

const INTENSIFIER_TOKENS: [&str; 3] = ["STRONG", "VERY", "HIGH"];
const BULLISH_TOKENS: [&str; 3] = ["BUY", "BULL", "POS"];
const BEARISH_TOKENS: [&str; 3] = ["SELL", "BEAR", "NEG"];
const RISK_TOKENS: [&str; 3] = ["AVOID", "DANGER", "RISK"];

/// Maps raw agent verdict strings onto `CanonicalVerdict`. Total: never fails.
#[derive(Debug, Clone)]
pub struct VerdictNormalizer {
    global: HashMap<String, CanonicalVerdict>,
    agents: HashMap<String, HashMap<String, CanonicalVerdict>>,
}

impl Default for VerdictNormalizer {
    fn default() -> Self {
        let mut normalizer = Self::empty();
        normalizer.extend_global(GLOBAL_VOCABULARY.iter().copied());
        for (agent, entries) in AGENT_VOCABULARIES {
            normalizer.extend_agent(agent, entries.iter().copied());
        }
        normalizer
    }
}

impl VerdictNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer with no vocabulary; only fuzzy matching applies.
    pub fn empty() -> Self {
        Self {
            global: HashMap::new(),
            agents: HashMap::new(),
        }
    }

    /// Later entries overwrite earlier ones with the same key.
    pub fn extend_global<'a>(&mut self, entries: impl IntoIterator<Item = (&'a str, CanonicalVerdict)>) {
        for (raw, verdict) in entries {
            self.global.insert(canonical_key(raw), verdict);
        }
    }

    pub fn extend_agent<'a>(
        &mut self,
        agent_name: &str,
        entries: impl IntoIterator<Item = (&'a str, CanonicalVerdict)>,
    ) {
        let table = self.agents.entry(agent_table_name(agent_name)).or_default();
        for (raw, verdict) in entries {
            table.insert(canonical_key(raw), verdict);
        }
    }

    pub fn normalize(&self, agent_name: &str, raw_verdict: &str) -> CanonicalVerdict {
        let key = canonical_key(raw_verdict);
        if key.is_empty() {
            return Hold;
        }

        if let Some(verdict) = self.agent_table(agent_name).and_then(|t| t.get(&key)) {
            return *verdict;
        }

        if let Some(verdict) = self.global.get(&key) {
            return *verdict;
        }

        fuzzy_polarity(&key).unwrap_or(Hold)
    }

    fn agent_table(&self, agent_name: &str) -> Option<&HashMap<String, CanonicalVerdict>> {
        let name = agent_name.trim().to_lowercase();
        self.agents
            .get(&name)
            .or_else(|| self.agents.get(&agent_table_name(&name)))
    }
}

fn canonical_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// `equity` and `equity_agent` share one table.
fn agent_table_name(agent_name: &str) -> String {
    let name = agent_name.trim().to_lowercase();
    if name.ends_with("_agent") {
        name
    } else {
        format!("{}_agent", name)
    }
}

fn fuzzy_polarity(key: &str) -> Option<CanonicalVerdict> {
    let has = |tokens: &[&str]| tokens.iter().any(|t| key.contains(t));

    let intense = has(&INTENSIFIER_TOKENS);
    let bullish = has(&BULLISH_TOKENS);
    let bearish = has(&BEARISH_TOKENS);

    if intense && bullish {
        Some(StrongBuy)
    } else if intense && bearish {
        Some(Avoid)
    } else if bullish {
        Some(Buy)
    } else if bearish {
        Some(Cautious)
    } else if has(&RISK_TOKENS) {
        Some(Avoid)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_table_takes_precedence() {
        let n = VerdictNormalizer::new();
        assert_eq!(n.normalize("equity_agent", "UP_TREND"), Buy);
        assert_eq!(n.normalize("equity", "down_trend"), Cautious);
        // Agent-specific words are not visible to other agents' tables
        assert_eq!(n.normalize("comm_agent", "SIDEWAYS"), Hold);
    }

    #[test]
    fn test_global_table() {
        let n = VerdictNormalizer::new();
        assert_eq!(n.normalize("options_agent", "EXECUTE"), StrongBuy);
        assert_eq!(n.normalize("equity_agent", "SELL"), Cautious);
        assert_eq!(n.normalize("trainer", "model_drift"), Cautious);
        assert_eq!(n.normalize("anything", "  very_bearish "), Avoid);
    }

    #[test]
    fn test_fuzzy_polarity() {
        let n = VerdictNormalizer::new();
        assert_eq!(n.normalize("x", "STRONGLY BULLISH BIAS"), StrongBuy);
        assert_eq!(n.normalize("x", "VERY NEGATIVE OUTLOOK"), Avoid);
        assert_eq!(n.normalize("x", "LEAN BUY"), Buy);
        assert_eq!(n.normalize("x", "SLIGHTLY BEARISH TILT"), Cautious);
        assert_eq!(n.normalize("x", "DANGER ZONE"), Avoid);
    }

    #[test]
    fn test_fallback_hold() {
        let n = VerdictNormalizer::new();
        assert_eq!(n.normalize("unknown_agent", "gibberish"), Hold);
        assert_eq!(n.normalize("unknown_agent", ""), Hold);
        assert_eq!(n.normalize("", "   "), Hold);
    }

    #[test]
    fn test_duplicate_keys_last_definition_wins() {
        let mut n = VerdictNormalizer::empty();
        n.extend_global([("NEUTRAL", Hold), ("NEUTRAL", Cautious)]);
        assert_eq!(n.normalize("any", "neutral"), Cautious);
    }

    #[test]
    fn test_badge_and_score_cover_all_verdicts() {
        for v in CanonicalVerdict::ALL {
            assert!(v.badge_class().starts_with("badge-"));
            assert_eq!(v.as_str().parse::<CanonicalVerdict>().unwrap(), v);
        }
        assert!(StrongBuy.score() > Avoid.score());
    }
}
