//! Execution context
//!
//! Owned by exactly one in-flight strategy run. Actions receive `&ExecutionContext`;
//! only the executor holds `&mut` and writes to it, between steps.

use crate::dataset::Dataset;
use crate::error::ErrorKind;
use crate::provenance::ProvenanceEntry;
use crate::result::ActionResult;
use crate::types::RunId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Statistics recorded for one step, by name
pub type StepStatistics = IndexMap<String, Value>;

/// Statistic name for the total rows a step wrote
pub const ROW_COUNT: &str = "row_count";

/// Shared store of named datasets, step statistics and provenance
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    run_id: RunId,
    datasets: IndexMap<String, Dataset>,
    statistics: IndexMap<String, StepStatistics>,
    provenance: Vec<ProvenanceEntry>,
}

impl ExecutionContext {
    /// Create empty context for a fresh run
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an input dataset before the run starts
    #[inline]
    #[must_use]
    pub fn with_dataset(mut self, key: impl Into<String>, dataset: Dataset) -> Self {
        self.datasets.insert(key.into(), dataset);
        self
    }

    /// Identifier of the run this context belongs to
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Dataset written under `key`
    #[inline]
    #[must_use]
    pub fn dataset(&self, key: &str) -> Option<&Dataset> {
        self.datasets.get(key)
    }

    /// Whether `key` has been written
    #[inline]
    #[must_use]
    pub fn contains_dataset(&self, key: &str) -> bool {
        self.datasets.contains_key(key)
    }

    /// Dataset keys in the order they were first written
    pub fn dataset_keys(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Statistics recorded by `step`
    #[inline]
    #[must_use]
    pub fn statistics(&self, step: &str) -> Option<&StepStatistics> {
        self.statistics.get(step)
    }

    /// One statistic recorded by `step`
    #[inline]
    #[must_use]
    pub fn statistic(&self, step: &str, name: &str) -> Option<&Value> {
        self.statistics.get(step).and_then(|stats| stats.get(name))
    }

    /// Provenance log in append order
    #[inline]
    #[must_use]
    pub fn provenance(&self) -> &[ProvenanceEntry] {
        &self.provenance
    }

    /// Apply an action result for `step`
    ///
    /// Writes every output dataset, records the step's statistics (plus a
    /// `row_count` total and a `<key>.row_count` per output) and appends the
    /// provenance entries. Takes the result by value so nothing can observe a
    /// half-applied state.
    pub fn apply(&mut self, step: &str, result: ActionResult) {
        let ActionResult {
            outputs,
            statistics,
            provenance,
            ..
        } = result;

        let mut stats = statistics;
        let mut total_rows = 0usize;
        for (key, dataset) in outputs {
            total_rows += dataset.len();
            stats.insert(format!("{key}.{ROW_COUNT}"), Value::from(dataset.len()));
            self.datasets.insert(key, dataset);
        }
        stats
            .entry(ROW_COUNT.to_string())
            .or_insert_with(|| Value::from(total_rows));

        self.statistics.insert(step.to_string(), stats);
        self.provenance.extend(provenance);
    }

    /// Append a provenance entry
    #[inline]
    pub fn record(&mut self, entry: ProvenanceEntry) {
        self.provenance.push(entry);
    }

    /// Append an error entry
    pub fn record_error(
        &mut self,
        step: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        attempt: u32,
        recovered: bool,
    ) {
        self.provenance.push(ProvenanceEntry::error(
            step, kind, message, attempt, recovered,
        ));
    }

    /// Export a serializable copy
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id,
            datasets: self.datasets.clone(),
            statistics: self.statistics.clone(),
            provenance: self.provenance.clone(),
        }
    }

    /// Consume the context into its exported form
    #[must_use]
    pub fn into_snapshot(self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id,
            datasets: self.datasets,
            statistics: self.statistics,
            provenance: self.provenance,
        }
    }
}

/// Serializable export of a context at run end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Run the context belonged to
    pub run_id: RunId,
    /// Datasets in first-write order
    pub datasets: IndexMap<String, Dataset>,
    /// Statistics keyed by step name
    pub statistics: IndexMap<String, StepStatistics>,
    /// Full provenance log, errors included
    pub provenance: Vec<ProvenanceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_writes_outputs_and_statistics() {
        let mut ctx = ExecutionContext::new();
        let result = ActionResult::success()
            .with_output("ids", Dataset::from_column("identifier", ["a", "b", "c"]))
            .with_statistic("unique", 3)
            .with_provenance([ProvenanceEntry::note("load", "loaded")]);

        ctx.apply("load", result);

        assert_eq!(ctx.dataset("ids").map(Dataset::len), Some(3));
        assert_eq!(ctx.statistic("load", "row_count"), Some(&json!(3)));
        assert_eq!(ctx.statistic("load", "ids.row_count"), Some(&json!(3)));
        assert_eq!(ctx.statistic("load", "unique"), Some(&json!(3)));
        assert_eq!(ctx.provenance().len(), 1);
    }

    #[test]
    fn action_supplied_row_count_wins() {
        let mut ctx = ExecutionContext::new();
        let result = ActionResult::success()
            .with_output("ids", Dataset::from_column("identifier", ["a"]))
            .with_statistic(ROW_COUNT, 99);
        ctx.apply("s", result);
        assert_eq!(ctx.statistic("s", ROW_COUNT), Some(&json!(99)));
    }

    #[test]
    fn record_error_appends() {
        let mut ctx = ExecutionContext::new();
        ctx.record_error("map", ErrorKind::Timeout, "slow", 1, false);
        assert_eq!(ctx.provenance()[0].error_kind(), Some(ErrorKind::Timeout));
    }

    #[test]
    fn snapshot_preserves_dataset_order() {
        let ctx = ExecutionContext::new()
            .with_dataset("b", Dataset::new())
            .with_dataset("a", Dataset::new());
        let snap = ctx.snapshot();
        let keys: Vec<_> = snap.datasets.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }
}
