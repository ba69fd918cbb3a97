//! Run reports and reporters
//!
//! A [`RunReport`] is handed to every registered [`Reporter`] once the run
//! has finished. Reporters are write-only: nothing they do feeds back into
//! execution.

use crate::state::{StepState, StrategyState};
use biomap_cache::CacheStats;
use biomap_core::{ActionError, ContextSnapshot, Dataset, ProvenanceEntry, RunId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step name
    pub name: String,
    /// Registry name of the step's action
    pub action_type: String,
    /// A failure of this step halts the run
    pub critical: bool,
    /// Every state the step passed through, ending in its final state
    pub states: Vec<StepState>,
    /// Executions started, 0 if the step never reached `Executing`
    pub attempts: u32,
    /// Error that failed the step
    pub error: Option<ActionError>,
    /// Warnings from the action or from a degraded failure
    pub warnings: Vec<String>,
    /// Rows written per output dataset
    pub row_counts: IndexMap<String, usize>,
    /// Wall time from queueing to final state
    pub duration_ms: u64,
}

impl StepReport {
    /// Final state
    #[must_use]
    pub fn state(&self) -> StepState {
        self.states.last().copied().unwrap_or(StepState::Queued)
    }

    /// Reached `Done`
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state() == StepState::Done
    }

    /// Reached `Failed`
    #[inline]
    #[must_use]
    pub fn failed(&self) -> bool {
        self.state() == StepState::Failed
    }

    /// Execution that had to be retried before the final outcome
    #[inline]
    #[must_use]
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Outcome of a strategy run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Strategy name
    pub strategy: String,
    /// Identifier of this run
    pub run_id: RunId,
    /// Final strategy state
    pub state: StrategyState,
    /// Every state the run passed through
    pub states: Vec<StrategyState>,
    /// One entry per strategy step, in strategy order
    pub steps: Vec<StepReport>,
    /// Context as left by the last applied step
    pub context: ContextSnapshot,
    /// Identifier cache counters at run end, when a cache is configured
    pub cache: Option<CacheStats>,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end, after the last step
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Every step done, none degraded
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == StrategyState::Succeeded
    }

    /// Finished, but some non-critical step failed or returned a partial result
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state == StrategyState::PartiallySucceeded
    }

    /// Report for the step called `name`
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Steps that ended `Failed`, critical or not
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.failed())
    }

    /// Names of steps that ran to completion, in order
    #[must_use]
    pub fn completed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.succeeded())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Dataset in the final context
    #[inline]
    #[must_use]
    pub fn dataset(&self, key: &str) -> Option<&Dataset> {
        self.context.datasets.get(key)
    }

    /// Full provenance log
    #[inline]
    #[must_use]
    pub fn provenance(&self) -> &[ProvenanceEntry] {
        &self.context.provenance
    }

    /// Error entries in the provenance log
    pub fn errors(&self) -> impl Iterator<Item = &ProvenanceEntry> {
        self.context
            .provenance
            .iter()
            .filter(|entry| entry.error_kind().is_some())
    }

    /// Wall time of the run
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Receives the final report of every run
pub trait Reporter: Send + Sync + fmt::Debug {
    /// Consume one finished run
    fn report(&self, report: &RunReport);
}

/// Logs a run summary and one line per failed step
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: &RunReport) {
        let failed = report.failed_steps().count();
        tracing::info!(
            strategy = %report.strategy,
            run_id = %report.run_id,
            state = %report.state,
            steps = report.steps.len(),
            completed = report.completed_steps().len(),
            failed,
            datasets = report.context.datasets.len(),
            provenance = report.provenance().len(),
            duration_ms = report.duration_ms(),
            "strategy run finished"
        );

        for step in report.failed_steps() {
            let error = step
                .error
                .as_ref()
                .map_or_else(String::new, ToString::to_string);
            tracing::warn!(
                strategy = %report.strategy,
                step = %step.name,
                critical = step.critical,
                attempts = step.attempts,
                error = %error,
                "step failed"
            );
        }

        if let Some(cache) = report.cache {
            tracing::debug!(
                hits = cache.hits,
                negative_hits = cache.negative_hits,
                misses = cache.misses,
                coalesced = cache.coalesced,
                upstream_calls = cache.upstream_calls,
                "identifier cache"
            );
        }
    }
}
