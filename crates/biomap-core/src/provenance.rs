//! Provenance log entries
//!
//! The log is append-only and records, per step, which path and resources
//! produced each mapped value and every error raised along the way.

use crate::error::ErrorKind;
use crate::types::{PathId, ResourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One provenance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// Step that produced the entry
    pub step: String,
    /// Wall-clock time of recording
    pub recorded_at: DateTime<Utc>,
    /// What happened
    pub kind: ProvenanceKind,
}

/// Provenance payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvenanceKind {
    /// A source identifier was mapped to a target identifier
    Mapping {
        source_identifier: String,
        target_identifier: String,
        path_id: Option<PathId>,
        resources: Vec<ResourceId>,
        confidence: f64,
    },
    /// An error was raised; `recovered` is true when a retry followed
    Error {
        error_kind: ErrorKind,
        message: String,
        attempt: u32,
        recovered: bool,
    },
    /// Free-form note (fallbacks, skipped rows)
    Note { message: String },
}

impl ProvenanceEntry {
    /// Create entry stamped with the current time
    #[must_use]
    pub fn new(step: impl Into<String>, kind: ProvenanceKind) -> Self {
        Self {
            step: step.into(),
            recorded_at: Utc::now(),
            kind,
        }
    }

    /// Mapping entry
    #[must_use]
    pub fn mapping(
        step: impl Into<String>,
        source_identifier: impl Into<String>,
        target_identifier: impl Into<String>,
        path_id: Option<PathId>,
        resources: Vec<ResourceId>,
        confidence: f64,
    ) -> Self {
        Self::new(
            step,
            ProvenanceKind::Mapping {
                source_identifier: source_identifier.into(),
                target_identifier: target_identifier.into(),
                path_id,
                resources,
                confidence,
            },
        )
    }

    /// Error entry
    #[must_use]
    pub fn error(
        step: impl Into<String>,
        error_kind: ErrorKind,
        message: impl Into<String>,
        attempt: u32,
        recovered: bool,
    ) -> Self {
        Self::new(
            step,
            ProvenanceKind::Error {
                error_kind,
                message: message.into(),
                attempt,
                recovered,
            },
        )
    }

    /// Note entry
    #[must_use]
    pub fn note(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            step,
            ProvenanceKind::Note {
                message: message.into(),
            },
        )
    }

    /// Error kind, if this is an error entry
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.kind {
            ProvenanceKind::Error { error_kind, .. } => Some(*error_kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_entry_exposes_kind() {
        let entry = ProvenanceEntry::error("map", ErrorKind::Execution, "boom", 1, true);
        assert_eq!(entry.error_kind(), Some(ErrorKind::Execution));
        assert_eq!(entry.step, "map");
        assert!(ProvenanceEntry::note("map", "x").error_kind().is_none());
    }

    #[test]
    fn provenance_serializes_with_type_tag() {
        let entry = ProvenanceEntry::note("s", "fallback used");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"]["type"], "note");
    }
}
