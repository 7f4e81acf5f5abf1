use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure class carried by a failed `AgentOutput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AgentNotFound,
    AgentDisabled,
    AgentTimeout,
    AgentFault,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AgentNotFound => "AGENT_NOT_FOUND",
            ErrorKind::AgentDisabled => "AGENT_DISABLED",
            ErrorKind::AgentTimeout => "AGENT_TIMEOUT",
            ErrorKind::AgentFault => "AGENT_FAULT",
            ErrorKind::Validation => "VALIDATION",
        }
    }

    /// Disabled and not-found are policy outcomes; retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorKind::AgentNotFound | ErrorKind::AgentDisabled | ErrorKind::Validation
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the agent framework to its callers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    #[error("Agent not found: {key}")]
    AgentNotFound { key: String },

    #[error("Agent is disabled: {key}")]
    AgentDisabled { key: String },

    #[error("Agent {key} failed ({kind}): {reason}")]
    AgentExecution {
        key: String,
        kind: ErrorKind,
        reason: String,
    },

    #[error("Rate limit exceeded for {key}: retry after {retry_after_secs}s")]
    RateLimitExceeded { key: String, retry_after_secs: u64 },

    #[error("Cooldown active for {key}: {remaining_secs}s remaining")]
    CooldownActive { key: String, remaining_secs: u64 },

    #[error("Persistence failure: {reason}")]
    Persistence { reason: String },

    #[error("Service unavailable: {reason}")]
    Unavailable { reason: String },
}

impl AgentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Validation { .. } => "VALIDATION_ERROR",
            AgentError::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            AgentError::AgentDisabled { .. } => "AGENT_DISABLED",
            AgentError::AgentExecution { .. } => "AGENT_EXECUTION_ERROR",
            AgentError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AgentError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            AgentError::Persistence { .. } => "PERSISTENCE_ERROR",
            AgentError::Unavailable { .. } => "SERVICE_UNAVAILABLE",
        }
    }

    /// HTTP-equivalent status class for the API layer.
    pub fn status(&self) -> u16 {
        match self {
            AgentError::Validation { .. } => 400,
            AgentError::AgentNotFound { .. } => 404,
            AgentError::AgentDisabled { .. } => 409,
            AgentError::CooldownActive { .. } => 409,
            AgentError::RateLimitExceeded { .. } => 429,
            AgentError::AgentExecution { kind, .. } if *kind == ErrorKind::AgentTimeout => 504,
            AgentError::AgentExecution { .. } => 500,
            AgentError::Persistence { .. } | AgentError::Unavailable { .. } => 503,
        }
    }

    /// True when a guard said no, as opposed to a run that failed.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(
            self,
            AgentError::AgentDisabled { .. }
                | AgentError::CooldownActive { .. }
                | AgentError::RateLimitExceeded { .. }
                | AgentError::Unavailable { .. }
        )
    }

    pub fn from_output_error(key: &str, kind: ErrorKind, reason: Option<&str>) -> Self {
        let reason = reason.unwrap_or(kind.as_str()).to_string();
        match kind {
            ErrorKind::AgentNotFound => AgentError::AgentNotFound {
                key: key.to_string(),
            },
            ErrorKind::AgentDisabled => AgentError::AgentDisabled {
                key: key.to_string(),
            },
            ErrorKind::Validation => AgentError::Validation { reason },
            ErrorKind::AgentTimeout | ErrorKind::AgentFault => AgentError::AgentExecution {
                key: key.to_string(),
                kind,
                reason,
            },
        }
    }
}
