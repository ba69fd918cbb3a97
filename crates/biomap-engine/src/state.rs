//! Strategy and step state machines
//!
//! ```text
//! strategy: Pending -> Running -> {Succeeded, Failed, PartiallySucceeded}
//! step:     Queued -> ResolvingParams -> Executing -> {Done, Retry, Failed}
//!           Retry -> {Executing, Failed}
//!           Queued -> Skipped
//! ```
//!
//! Every state change goes through [`validate_transition`]; an illegal
//! transition is a bug in the executor and surfaces as [`StateError`].

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State machine with a static transition table
pub trait Transitions: Copy + Eq + fmt::Display {
    /// States reachable in one step; empty for terminal states
    fn allowed_transitions(self) -> Vec<Self>;

    #[inline]
    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Strategy run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    /// Created, not started
    Pending,
    /// Steps in progress
    Running,
    /// Every step done and none degraded
    Succeeded,
    /// Halted by a critical or fatal failure
    Failed,
    /// At least one non-critical step failed or returned a partial result
    PartiallySucceeded,
}

impl Transitions for StrategyState {
    fn allowed_transitions(self) -> Vec<Self> {
        use StrategyState::*;
        match self {
            Pending => vec![Running],
            Running => vec![Succeeded, Failed, PartiallySucceeded],
            Succeeded | Failed | PartiallySucceeded => vec![],
        }
    }
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::PartiallySucceeded => "partially_succeeded",
        };
        f.write_str(name)
    }
}

/// Per-step state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting for earlier steps
    Queued,
    /// Substituting placeholders and validating
    ResolvingParams,
    /// Action running
    Executing,
    /// Waiting out the backoff before the next attempt
    Retry,
    /// Outputs applied to the context
    Done,
    /// Gave up; outputs were not applied
    Failed,
    /// Never started because an earlier step halted the run
    Skipped,
}

impl Transitions for StepState {
    fn allowed_transitions(self) -> Vec<Self> {
        use StepState::*;
        match self {
            Queued => vec![ResolvingParams, Skipped],
            ResolvingParams => vec![Executing, Failed],
            Executing => vec![Done, Retry, Failed],
            Retry => vec![Executing, Failed],
            Done | Failed | Skipped => vec![],
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::ResolvingParams => "resolving_params",
            Self::Executing => "executing",
            Self::Retry => "retry",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Validates a state transition
///
/// # Errors
/// [`StateError`] if `to` is not reachable from `from` in one step.
pub fn validate_transition<S: Transitions>(from: S, to: S) -> Result<(), StateError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StateError {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn allowed<S: Transitions>(from: S, to: S) -> bool {
    from.allowed_transitions().into_iter().any(|s| s == to)
}

/// Current state plus every state visited, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateHistory<S> {
    history: Vec<S>,
}

impl<S: Transitions> StateHistory<S> {
    /// History starting at `initial`
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            history: vec![initial],
        }
    }

    /// Latest state
    #[must_use]
    pub fn current(&self) -> S {
        // history is never empty
        self.history[self.history.len() - 1]
    }

    /// Move to `to`, recording it
    ///
    /// # Errors
    /// [`StateError`] on an illegal transition; the state is left unchanged.
    pub fn advance(&mut self, to: S) -> Result<(), StateError> {
        validate_transition(self.current(), to)?;
        self.history.push(to);
        Ok(())
    }

    /// Every state visited, current last
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[S] {
        &self.history
    }

    /// Take the visited states
    #[inline]
    #[must_use]
    pub fn into_history(self) -> Vec<S> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_happy_path() {
        let mut state = StateHistory::new(StrategyState::Pending);
        state.advance(StrategyState::Running).unwrap();
        state.advance(StrategyState::PartiallySucceeded).unwrap();
        assert!(state.current().is_terminal());
        assert_eq!(
            state.history(),
            &[
                StrategyState::Pending,
                StrategyState::Running,
                StrategyState::PartiallySucceeded
            ]
        );
    }

    #[test]
    fn strategy_cannot_skip_running() {
        let err = validate_transition(StrategyState::Pending, StrategyState::Succeeded).unwrap_err();
        assert_eq!(err.from, "pending");
        assert_eq!(err.to, "succeeded");
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for s in [StrategyState::Succeeded, StrategyState::Failed] {
            assert!(validate_transition(s, StrategyState::Running).is_err());
        }
        for s in [StepState::Done, StepState::Failed, StepState::Skipped] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn step_retry_loop() {
        let mut state = StateHistory::new(StepState::Queued);
        for next in [
            StepState::ResolvingParams,
            StepState::Executing,
            StepState::Retry,
            StepState::Executing,
            StepState::Retry,
            StepState::Executing,
            StepState::Done,
        ] {
            state.advance(next).unwrap();
        }
        assert_eq!(state.history().len(), 8);
    }

    #[test]
    fn illegal_step_transition_leaves_state() {
        let mut state = StateHistory::new(StepState::Queued);
        assert!(state.advance(StepState::Executing).is_err());
        assert_eq!(state.current(), StepState::Queued);
        assert!(validate_transition(StepState::Done, StepState::Retry).is_err());
    }
}
