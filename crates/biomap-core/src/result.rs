//! Action results
//!
//! Actions never touch the [`ExecutionContext`](crate::ExecutionContext)
//! directly. They return an [`ActionResult`] and the executor applies it in
//! one step.

use crate::dataset::Dataset;
use crate::provenance::ProvenanceEntry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome classification reported by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Everything requested was produced
    Success,
    /// Outputs were produced but some inputs could not be handled
    Partial,
    /// The action ran but could not produce its outputs
    Failure,
}

/// Everything an action hands back to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Overall outcome
    pub status: ActionStatus,
    /// Datasets to write, keyed by context dataset key
    pub outputs: IndexMap<String, Dataset>,
    /// Step statistics other steps may reference
    pub statistics: IndexMap<String, Value>,
    /// Non-fatal problems, surfaced in the step report
    pub warnings: Vec<String>,
    /// Entries appended to the context log
    pub provenance: Vec<ProvenanceEntry>,
}

impl ActionResult {
    /// Empty successful result
    #[inline]
    #[must_use]
    pub fn success() -> Self {
        Self::with_status(ActionStatus::Success)
    }

    /// Empty partial result
    #[inline]
    #[must_use]
    pub fn partial() -> Self {
        Self::with_status(ActionStatus::Partial)
    }

    /// Failed result carrying a reason as its first warning
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Failure).with_warning(reason)
    }

    fn with_status(status: ActionStatus) -> Self {
        Self {
            status,
            outputs: IndexMap::new(),
            statistics: IndexMap::new(),
            warnings: Vec::new(),
            provenance: Vec::new(),
        }
    }

    /// Add output dataset
    #[inline]
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, dataset: Dataset) -> Self {
        self.outputs.insert(key.into(), dataset);
        self
    }

    /// Add statistic
    #[inline]
    #[must_use]
    pub fn with_statistic(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.statistics.insert(name.into(), value.into());
        self
    }

    /// Add warning
    #[inline]
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Add provenance entries
    #[inline]
    #[must_use]
    pub fn with_provenance(mut self, entries: impl IntoIterator<Item = ProvenanceEntry>) -> Self {
        self.provenance.extend(entries);
        self
    }

    /// Downgrade a success to partial
    #[inline]
    pub fn mark_partial(&mut self) {
        if self.status == ActionStatus::Success {
            self.status = ActionStatus::Partial;
        }
    }

    /// Dataset keys this result writes
    #[must_use]
    pub fn written_keys(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }

    /// Row count per written dataset
    #[must_use]
    pub fn row_counts(&self) -> IndexMap<String, usize> {
        self.outputs
            .iter()
            .map(|(key, ds)| (key.clone(), ds.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_outputs_and_counts() {
        let result = ActionResult::success()
            .with_output("ids", Dataset::from_column("identifier", ["a", "b"]))
            .with_output("empty", Dataset::new())
            .with_statistic("shared", 3)
            .with_warning("one row skipped");

        assert_eq!(result.written_keys(), vec!["ids".to_string(), "empty".to_string()]);
        assert_eq!(result.row_counts()["ids"], 2);
        assert_eq!(result.row_counts()["empty"], 0);
        assert_eq!(result.statistics["shared"], 3);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn mark_partial_only_downgrades_success() {
        let mut ok = ActionResult::success();
        ok.mark_partial();
        assert_eq!(ok.status, ActionStatus::Partial);

        let mut failed = ActionResult::failure("no rows");
        failed.mark_partial();
        assert_eq!(failed.status, ActionStatus::Failure);
        assert_eq!(failed.warnings, vec!["no rows".to_string()]);
    }
}
