//! Agent descriptors loaded from TOML.
//!
//! ```toml
//! [agents.equity]
//! display_name = "Equity Agent"
//! enabled = true
//! max_runtime_sec = 10
//! cooldown_secs = 3600
//! rate_limit_per_window = 6
//! triggers = ["TIGHTEN_RISK", "THROTTLE"]
//! products = ["equities"]
//!
//! [agents.equity.config]
//! lookback_days = 30
//! ```
//!
//! Malformed entries are skipped with a warning; they never abort the load.

use crate::domain::agents::AgentDescriptor;
use crate::domain::kpi::TriggerType;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_AGENT_KEYS: [&str; 7] =
    ["dev", "trainer", "equity", "options", "comm", "new", "sentiment"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentEntry {
    display_name: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    config: HashMap<String, Value>,
    max_runtime_sec: Option<u64>,
    cooldown_secs: Option<u64>,
    cooldown_days: Option<u64>,
    rate_limit_per_window: Option<u32>,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    products: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Parsed agent registry source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentsConfig {
    pub agents: Vec<AgentDescriptor>,
    /// Keys whose entries could not be parsed.
    pub skipped: Vec<String>,
}

impl AgentsConfig {
    /// The built-in agent set: trainer answers RETRAIN, the product agents
    /// answer risk triggers for their product, dev answers ALERT.
    pub fn defaults(trainer_cooldown_days: u32) -> Self {
        let agents = DEFAULT_AGENT_KEYS
            .iter()
            .map(|key| default_descriptor(key, trainer_cooldown_days))
            .collect();
        Self {
            agents,
            skipped: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agents file {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid agents file {:?}", path))
    }

    /// Fails only when the document itself is not valid TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: toml::Table = toml::from_str(content).context("Failed to parse agents TOML")?;
        let mut config = Self::default();

        let Some(agents) = document.get("agents") else {
            warn!("AgentsConfig: No [agents] section found");
            return Ok(config);
        };
        let Some(agents) = agents.as_table() else {
            anyhow::bail!("'agents' must be a table of agent entries");
        };

        for (key, raw) in agents {
            match parse_entry(key, raw.clone()) {
                Ok(descriptor) => config.agents.push(descriptor),
                Err(e) => {
                    warn!("AgentsConfig: Skipping agent '{}': {:#}", key, e);
                    config.skipped.push(key.clone());
                }
            }
        }
        Ok(config)
    }
}

fn parse_entry(key: &str, raw: toml::Value) -> Result<AgentDescriptor> {
    if key.trim().is_empty() {
        anyhow::bail!("empty agent key");
    }
    let entry: AgentEntry = raw.try_into().context("malformed entry")?;

    let mut triggers = Vec::new();
    for name in &entry.triggers {
        match name.parse::<TriggerType>() {
            Ok(trigger) if !triggers.contains(&trigger) => triggers.push(trigger),
            Ok(_) => {}
            Err(_) => warn!("AgentsConfig: Agent '{}' lists unknown trigger '{}'", key, name),
        }
    }

    // cooldown_secs wins when both are given
    let cooldown_secs = entry
        .cooldown_secs
        .or(entry.cooldown_days.map(|days| days * 86_400));

    let mut descriptor = AgentDescriptor::new(
        key,
        entry.display_name.unwrap_or_else(|| display_name_for(key)),
    );
    descriptor.enabled = entry.enabled;
    descriptor.config = entry.config;
    descriptor.max_runtime_sec = entry.max_runtime_sec;
    descriptor.cooldown_secs = cooldown_secs;
    descriptor.rate_limit_per_window = entry.rate_limit_per_window;
    descriptor.triggers = triggers;
    descriptor.products = entry.products.iter().map(|p| p.to_lowercase()).collect();
    Ok(descriptor)
}

fn display_name_for(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => format!("{}{} Agent", first.to_uppercase(), chars.as_str()),
        None => "Agent".to_string(),
    }
}

fn default_descriptor(key: &str, trainer_cooldown_days: u32) -> AgentDescriptor {
    let base = AgentDescriptor::new(key, display_name_for(key));
    let risk = [TriggerType::TightenRisk, TriggerType::Throttle];
    match key {
        "trainer" => base
            .with_triggers(&[TriggerType::Retrain])
            .with_cooldown_secs(trainer_cooldown_days as u64 * 86_400),
        "equity" => base.with_triggers(&risk).with_products(&["equities"]),
        "options" => base.with_triggers(&risk).with_products(&["options"]),
        "comm" => base.with_triggers(&risk).with_products(&["comm"]),
        "dev" => base.with_triggers(&[TriggerType::Alert]),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_agent() {
        let config = AgentsConfig::defaults(3);
        let keys: Vec<_> = config.agents.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, DEFAULT_AGENT_KEYS);

        let trainer = &config.agents[1];
        assert_eq!(trainer.cooldown_secs, Some(3 * 86_400));
        assert!(trainer.answers(TriggerType::Retrain));

        let equity = &config.agents[2];
        assert!(equity.serves_product("equities"));
        assert!(!equity.serves_product("options"));
    }

    #[test]
    fn test_from_toml_skips_malformed_entries() {
        let toml = r#"
            [agents.equity]
            display_name = "Equity"
            triggers = ["TIGHTEN_RISK", "THROTTLE", "BOGUS"]
            products = ["Equities"]
            cooldown_days = 1

            [agents.equity.config]
            lookback_days = 30

            [agents.broken]
            enabled = "yes"

            [agents.sentiment]
            enabled = false
        "#;
        let config = AgentsConfig::from_toml_str(toml).unwrap();

        assert_eq!(config.skipped, vec!["broken".to_string()]);
        assert_eq!(config.agents.len(), 2);

        let equity = config.agents.iter().find(|a| a.key == "equity").unwrap();
        assert_eq!(equity.triggers.len(), 2);
        assert_eq!(equity.products, vec!["equities"]);
        assert_eq!(equity.cooldown_secs, Some(86_400));
        assert_eq!(equity.config["lookback_days"], serde_json::json!(30));

        let sentiment = config.agents.iter().find(|a| a.key == "sentiment").unwrap();
        assert!(!sentiment.enabled);
        assert_eq!(sentiment.display_name, "Sentiment Agent");
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(AgentsConfig::from_toml_str("agents = [").is_err());
        assert!(AgentsConfig::from_toml_str("agents = 3").is_err());
        assert!(AgentsConfig::from_toml_str("").unwrap().agents.is_empty());
    }
}
