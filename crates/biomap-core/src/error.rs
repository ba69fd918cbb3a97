//! Error taxonomy shared by actions and the executor
//!
//! The executor's failure policy is keyed off these variants:
//! - `Configuration`: fatal, aborts the whole strategy, never retried
//! - `Validation`: step-local, never retried, follows the step's `critical` flag
//! - `Execution`: transient, retried with backoff, then follows `critical`
//! - `Timeout`: treated like an `Execution` error whose retries are exhausted

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error classification recorded in the provenance log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unresolved required variable or context reference
    Configuration,
    /// Parameter schema violation
    Validation,
    /// Runtime failure inside an action or upstream client
    Execution,
    /// No resource chain connects the requested ontology types
    NoPathFound,
    /// Waiting on an in-flight cache resolution took too long
    CacheLockTimeout,
    /// Step exceeded its timeout
    Timeout,
    /// Run was cancelled
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::NoPathFound => "no_path_found",
            Self::CacheLockTimeout => "cache_lock_timeout",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Error raised while preparing or running an action
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum ActionError {
    /// Required variable or context reference could not be resolved
    #[error("configuration error: '{variable}': {message}")]
    Configuration { variable: String, message: String },

    /// Parameter failed schema validation
    #[error("validation error on field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Runtime failure; `kind` distinguishes generic failures from
    /// path-finding failures surfaced through the same channel
    #[error("execution error ({kind}): {message}")]
    Execution { kind: ErrorKind, message: String },

    /// Step timed out
    #[error("step timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Run cancelled while the step was in flight
    #[error("action cancelled")]
    Cancelled,
}

impl ActionError {
    /// Create configuration error
    #[inline]
    pub fn configuration(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Create validation error
    #[inline]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create generic execution error
    #[inline]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            kind: ErrorKind::Execution,
            message: message.into(),
        }
    }

    /// Classification for provenance and policy decisions
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Execution { kind, .. } => *kind,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Check if error aborts the strategy regardless of step criticality
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Cancelled)
    }
}
