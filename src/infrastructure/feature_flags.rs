use crate::domain::ports::{FeatureFlags, flags};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// Flags held in memory and toggled at runtime. Unknown flags read as the
/// configured fallback.
pub struct InMemoryFeatureFlags {
    flags: RwLock<HashMap<String, bool>>,
    fallback: bool,
}

impl Default for InMemoryFeatureFlags {
    fn default() -> Self {
        let flags = [
            (flags::AGENTS_FRAMEWORK, true),
            (flags::BACKGROUND_KPI_JOBS, true),
            (flags::GOAHEAD_TRIGGERS, true),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            flags: RwLock::new(flags),
            fallback: false,
        }
    }
}

impl InMemoryFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by a `flag=bool,flag=bool` list, as found in
    /// `FEATURE_FLAGS`. Malformed entries are skipped with a warning.
    pub fn from_spec(spec: &str) -> Self {
        let flags = Self::default();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = match entry.split_once('=') {
                Some((name, value)) => (name.trim(), value.trim()),
                None => (entry, "true"),
            };
            match value.parse::<bool>() {
                Ok(value) => flags.set(name, value),
                Err(_) => warn!("FeatureFlags: Ignoring malformed entry '{}'", entry),
            }
        }
        flags
    }

    pub fn set(&self, flag: &str, enabled: bool) {
        match self.flags.write() {
            Ok(mut flags) => {
                flags.insert(flag.to_string(), enabled);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(flag.to_string(), enabled);
            }
        }
        info!("FeatureFlags: {} = {}", flag, enabled);
    }

    /// Sets `flag` only if nothing has set it yet. Returns whether it was set.
    pub fn set_default(&self, flag: &str, enabled: bool) -> bool {
        let mut flags = match self.flags.write() {
            Ok(flags) => flags,
            Err(poisoned) => poisoned.into_inner(),
        };
        if flags.contains_key(flag) {
            return false;
        }
        flags.insert(flag.to_string(), enabled);
        true
    }

    pub fn snapshot(&self) -> HashMap<String, bool> {
        match self.flags.read() {
            Ok(flags) => flags.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl FeatureFlags for InMemoryFeatureFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        let flags = match self.flags.read() {
            Ok(flags) => flags,
            Err(poisoned) => poisoned.into_inner(),
        };
        flags.get(flag).copied().unwrap_or(self.fallback)
    }
}
