//! Error types for the engine
//!
//! Step failures are not errors at this level: they are recorded in the
//! provenance log and reflected in the [`RunReport`](crate::RunReport). These
//! types cover configuration loading, engine assembly and state-machine
//! violations.

use biomap_paths::PathError;
use std::path::PathBuf;

/// Engine configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config document is not valid TOML for [`EngineConfig`](crate::EngineConfig)
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but holds an out-of-range value
    #[error("invalid config value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    #[inline]
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Attempted state change not present in the transition table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal state transition: {from} -> {to}")]
pub struct StateError {
    /// State before the attempted change
    pub from: String,
    /// Rejected target state
    pub to: String,
}

/// Engine-level failure
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid engine configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Resource graph could not be loaded
    #[error("resource graph: {0}")]
    Graph(#[from] PathError),

    /// Illegal state transition
    #[error(transparent)]
    State(#[from] StateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_names_field() {
        let err = ConfigError::invalid("retry.multiplier", "must be at least 1.0");
        assert!(err.to_string().contains("retry.multiplier"));
    }

    #[test]
    fn state_error_wraps_into_engine_error() {
        let err: EngineError = StateError {
            from: "done".to_string(),
            to: "executing".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "illegal state transition: done -> executing");
    }
}
