//! Strategy executor
//!
//! Walks a strategy's steps strictly in order. For each step:
//!
//! 1. resolve parameters against variables and the context so far
//! 2. look the action up in the registry and validate the parameters
//! 3. execute, with the step's timeout and retry policy
//! 4. apply the returned [`ActionResult`] to the context
//!
//! Only the executor writes to the [`ExecutionContext`], and only between
//! steps. Failure policy:
//! - `Configuration` and `Cancelled` errors halt the run whatever the step's
//!   `critical` flag says
//! - `Execution` errors are retried up to `retry_count` times with backoff
//! - everything else, and exhausted retries, fail the step; a critical step
//!   halts the run (`Failed`), a non-critical one lets it continue
//!   (`PartiallySucceeded`)
//!
//! Every error, retried or final, is appended to the provenance log.

use crate::config::EngineConfig;
use crate::error::{EngineError, StateError};
use crate::params::ParameterResolver;
use crate::report::{Reporter, RunReport, StepReport};
use crate::retry::Backoff;
use crate::state::{StateHistory, StepState, StrategyState};
use biomap_actions::{Action, ActionContext, ActionRegistry, ActionServices};
use biomap_cache::{CacheManager, MemoryCacheStore};
use biomap_core::{
    ActionError, ActionResult, ActionStatus, ClientRegistry, ErrorKind, ExecutionContext, Step,
    Strategy, VariableProvider,
};
use biomap_paths::{ChainResolver, PathFinder, ResourceGraph, ResourceGraphProvider};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What a finished step means for the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Done,
    /// Non-critical failure or partial result; the run continues
    Degraded,
    Halt,
}

/// Runs strategies against a fixed action table and set of services
#[derive(Debug, Clone)]
pub struct StrategyExecutor {
    registry: Arc<ActionRegistry>,
    services: ActionServices,
    params: ParameterResolver,
    config: EngineConfig,
    backoff: Backoff,
    reporters: Vec<Arc<dyn Reporter>>,
}

impl StrategyExecutor {
    /// Create executor with default config, no variables and no services
    #[must_use]
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        let config = EngineConfig::default();
        Self {
            registry,
            services: ActionServices::new().with_max_concurrency(config.max_concurrency),
            params: ParameterResolver::default(),
            backoff: Backoff::from_config(&config.retry),
            config,
            reporters: Vec::new(),
        }
    }

    /// Build a fully wired executor: resource graph, path finder, in-memory
    /// identifier cache and chain resolver over `clients`
    ///
    /// # Errors
    /// [`EngineError::Config`] for an invalid config, [`EngineError::Graph`]
    /// when the resource graph cannot be loaded.
    pub async fn assemble(
        config: EngineConfig,
        registry: Arc<ActionRegistry>,
        provider: &dyn ResourceGraphProvider,
        clients: ClientRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let graph = ResourceGraph::load(provider).await?;
        let finder = PathFinder::new(Arc::new(graph)).with_max_hops(config.max_hops);
        let store = Arc::new(MemoryCacheStore::new(config.cache.max_capacity));
        let cache = CacheManager::new(store, config.to_cache_policy());

        let services = ActionServices::new()
            .with_path_finder(Arc::new(finder))
            .with_cache(Arc::new(cache))
            .with_resolver(Arc::new(
                ChainResolver::new(clients).with_max_concurrency(config.max_concurrency),
            ))
            .with_max_concurrency(config.max_concurrency);

        Ok(Self::new(registry).with_config(config).with_services(services))
    }

    /// Replace config; also resets the backoff schedule and fan-out bound
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.backoff = Backoff::from_config(&config.retry);
        self.services = self.services.with_max_concurrency(config.max_concurrency);
        self.config = config;
        self
    }

    /// Replace the collaborators handed to actions
    #[inline]
    #[must_use]
    pub fn with_services(mut self, services: ActionServices) -> Self {
        self.services = services;
        self
    }

    /// Resolve `${name}` placeholders against `variables`
    #[inline]
    #[must_use]
    pub fn with_variables(mut self, variables: Arc<dyn VariableProvider>) -> Self {
        self.params = ParameterResolver::new(variables);
        self
    }

    /// Override the retry delay schedule
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Add a sink for the final report of every run
    #[inline]
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Action table steps are resolved against
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Collaborators shared by every run
    #[inline]
    #[must_use]
    pub fn services(&self) -> &ActionServices {
        &self.services
    }

    /// Engine settings in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `strategy` to completion over `context`
    ///
    /// Step failures do not surface as `Err`; they are in the report.
    ///
    /// # Errors
    /// [`EngineError::State`] only if the executor attempts an illegal state
    /// transition.
    pub async fn run(
        &self,
        strategy: &Strategy,
        context: ExecutionContext,
    ) -> Result<RunReport, EngineError> {
        self.run_with_cancel(strategy, context, CancellationToken::new())
            .await
    }

    /// Run `strategy`, stopping early once `cancel` fires
    ///
    /// Cancellation is observed before each step, during retry backoff and
    /// by the in-flight action through its child token. Cache entries
    /// committed before cancellation stay.
    ///
    /// # Errors
    /// As [`StrategyExecutor::run`].
    pub async fn run_with_cancel(
        &self,
        strategy: &Strategy,
        context: ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let span = tracing::info_span!(
            "strategy",
            strategy = %strategy.name(),
            run_id = %context.run_id()
        );
        let report = self.drive(strategy, context, &cancel).instrument(span).await?;
        for reporter in &self.reporters {
            reporter.report(&report);
        }
        Ok(report)
    }

    async fn drive(
        &self,
        strategy: &Strategy,
        mut context: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let services = self.services.for_run();
        let mut state = StateHistory::new(StrategyState::Pending);
        state.advance(StrategyState::Running)?;
        tracing::info!(steps = strategy.len(), "strategy started");

        let mut steps = Vec::with_capacity(strategy.len());
        let mut degraded = false;
        let mut halted = false;

        for step in strategy.steps() {
            if !halted && cancel.is_cancelled() {
                tracing::warn!(step = %step.name, "run cancelled before step started");
                context.record_error(
                    &step.name,
                    ErrorKind::Cancelled,
                    "run cancelled before step started",
                    0,
                    false,
                );
                halted = true;
            }
            if halted {
                steps.push(skipped(step)?);
                continue;
            }

            let span = tracing::info_span!(
                "step",
                step = %step.name,
                action = %step.action_type(),
                critical = step.metadata.critical
            );
            let runner = StepRunner::new(self, step, &services, cancel);
            let (report, outcome) = runner.run(&mut context).instrument(span).await?;
            steps.push(report);

            match outcome {
                StepOutcome::Done => {}
                StepOutcome::Degraded => degraded = true,
                StepOutcome::Halt => halted = true,
            }
        }

        let final_state = if halted {
            StrategyState::Failed
        } else if degraded {
            StrategyState::PartiallySucceeded
        } else {
            StrategyState::Succeeded
        };
        state.advance(final_state)?;
        tracing::info!(state = %final_state, "strategy finished");

        Ok(RunReport {
            strategy: strategy.name().to_string(),
            run_id: context.run_id(),
            state: final_state,
            states: state.into_history(),
            steps,
            cache: services.cache().map(CacheManager::stats),
            context: context.into_snapshot(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}

fn skipped(step: &Step) -> Result<StepReport, StateError> {
    let mut states = StateHistory::new(StepState::Queued);
    states.advance(StepState::Skipped)?;
    Ok(StepReport {
        name: step.name.clone(),
        action_type: step.action_type().to_string(),
        critical: step.metadata.critical,
        states: states.into_history(),
        attempts: 0,
        error: None,
        warnings: Vec::new(),
        row_counts: IndexMap::new(),
        duration_ms: 0,
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One step's journey through its state machine
struct StepRunner<'a> {
    executor: &'a StrategyExecutor,
    step: &'a Step,
    services: &'a ActionServices,
    cancel: &'a CancellationToken,
    states: StateHistory<StepState>,
    attempts: u32,
    started: Instant,
}

impl<'a> StepRunner<'a> {
    fn new(
        executor: &'a StrategyExecutor,
        step: &'a Step,
        services: &'a ActionServices,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            executor,
            step,
            services,
            cancel,
            states: StateHistory::new(StepState::Queued),
            attempts: 0,
            started: Instant::now(),
        }
    }

    async fn run(
        mut self,
        context: &mut ExecutionContext,
    ) -> Result<(StepReport, StepOutcome), StateError> {
        self.states.advance(StepState::ResolvingParams)?;
        let (action, params) = match self.prepare(context) {
            Ok(prepared) => prepared,
            Err(error) => return self.fail(error, context),
        };

        let max_attempts = self.step.metadata.retry_count.saturating_add(1);
        loop {
            self.states.advance(StepState::Executing)?;
            self.attempts += 1;
            let attempt = self.attempts;
            tracing::debug!(attempt, max_attempts, "executing step");

            let error = match self.execute_once(action.as_ref(), params.clone(), context).await {
                Ok(result) => return self.complete(result, context),
                Err(error) => error,
            };
            if !error.is_retryable() || attempt >= max_attempts {
                return self.fail(error, context);
            }

            let delay = self.executor.backoff.delay(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = millis(delay),
                error = %error,
                "step attempt failed, retrying"
            );
            context.record_error(&self.step.name, error.kind(), error.to_string(), attempt, true);
            self.states.advance(StepState::Retry)?;

            let cancel = self.cancel;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return self.fail(ActionError::Cancelled, context),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Resolve parameters, look up the handler, validate
    fn prepare(&self, context: &ExecutionContext) -> Result<(Arc<dyn Action>, Value), ActionError> {
        let params = self.executor.params.resolve(&self.step.action.params, context)?;
        let action = self.executor.registry.create(self.step.action_type())?;
        let validated = action.validate(&params)?;
        Ok((action, validated))
    }

    async fn execute_once(
        &self,
        action: &dyn Action,
        params: Value,
        context: &ExecutionContext,
    ) -> Result<ActionResult, ActionError> {
        let token = self.cancel.child_token();
        let ctx = ActionContext::new(&self.step.name, context, self.services)
            .with_cancel(token.clone())
            .with_cache_results(self.step.metadata.cache_results)
            .with_attempt(self.attempts);

        let guarded = async {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(ActionError::Cancelled),
                result = action.execute(params, ctx) => result,
            }
        };

        let timeout = self
            .step
            .metadata
            .timeout()
            .or_else(|| self.executor.config.default_timeout());
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .unwrap_or(Err(ActionError::Timeout {
                    timeout_ms: millis(limit),
                })),
            None => guarded.await,
        };
        // stops anything the action spawned and left running
        token.cancel();

        let result = result?;
        if result.status == ActionStatus::Failure {
            let reason = result
                .warnings
                .first()
                .cloned()
                .unwrap_or_else(|| "action reported failure".to_string());
            return Err(ActionError::execution(reason));
        }
        Ok(result)
    }

    fn complete(
        mut self,
        result: ActionResult,
        context: &mut ExecutionContext,
    ) -> Result<(StepReport, StepOutcome), StateError> {
        self.states.advance(StepState::Done)?;

        let row_counts = result.row_counts();
        let warnings = result.warnings.clone();
        for warning in &warnings {
            tracing::warn!(warning = %warning, "step warning");
        }
        tracing::info!(
            attempts = self.attempts,
            status = ?result.status,
            outputs = ?result.written_keys(),
            "step done"
        );
        // partial outputs are kept but the run can no longer fully succeed
        let outcome = if result.status == ActionStatus::Partial {
            StepOutcome::Degraded
        } else {
            StepOutcome::Done
        };
        context.apply(&self.step.name, result);

        Ok((self.report(None, warnings, row_counts), outcome))
    }

    fn fail(
        mut self,
        error: ActionError,
        context: &mut ExecutionContext,
    ) -> Result<(StepReport, StepOutcome), StateError> {
        self.states.advance(StepState::Failed)?;

        let halt = error.is_fatal() || self.step.metadata.critical;
        context.record_error(
            &self.step.name,
            error.kind(),
            error.to_string(),
            self.attempts,
            !halt,
        );

        let mut warnings = Vec::new();
        let outcome = if halt {
            tracing::error!(
                attempts = self.attempts,
                kind = %error.kind(),
                error = %error,
                "step failed, halting strategy"
            );
            StepOutcome::Halt
        } else {
            tracing::warn!(
                attempts = self.attempts,
                kind = %error.kind(),
                error = %error,
                "non-critical step failed, continuing"
            );
            warnings.push(format!("non-critical step '{}' failed: {error}", self.step.name));
            StepOutcome::Degraded
        };

        Ok((self.report(Some(error), warnings, IndexMap::new()), outcome))
    }

    fn report(
        self,
        error: Option<ActionError>,
        warnings: Vec<String>,
        row_counts: IndexMap<String, usize>,
    ) -> StepReport {
        StepReport {
            name: self.step.name.clone(),
            action_type: self.step.action_type().to_string(),
            critical: self.step.metadata.critical,
            states: self.states.into_history(),
            attempts: self.attempts,
            error,
            warnings,
            row_counts,
            duration_ms: millis(self.started.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use async_trait::async_trait;
    use biomap_actions::ParamSchema;
    use biomap_core::Dataset;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with an execution error until its `fail_times` budget is spent
    #[derive(Debug, Default)]
    struct Flaky {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Action for Flaky {
        fn action_type(&self) -> &str {
            "flaky"
        }

        fn schema(&self) -> ParamSchema {
            ParamSchema::new()
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: ActionContext<'_>,
        ) -> Result<ActionResult, ActionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(ActionError::execution(format!("transient failure {call}")))
            } else {
                Ok(ActionResult::success().with_output("out", Dataset::from_column("v", ["x"])))
            }
        }
    }

    fn executor(fail_times: u32) -> StrategyExecutor {
        let mut registry = ActionRegistry::new();
        let flaky = Arc::new(Flaky {
            fail_times,
            calls: AtomicU32::new(0),
        });
        registry
            .register("flaky", move || Arc::clone(&flaky) as Arc<dyn Action>)
            .unwrap();
        StrategyExecutor::new(Arc::new(registry)).with_backoff(Backoff::immediate())
    }

    #[tokio::test]
    async fn retries_until_success() {
        let strategy = Strategy::new(
            "s",
            vec![Step::new("flaky", "flaky", json!({})).with_retries(2)],
        )
        .unwrap();

        let report = executor(2).run(&strategy, ExecutionContext::new()).await.unwrap();

        assert_eq!(report.state, StrategyState::Succeeded);
        let step = report.step("flaky").unwrap();
        assert_eq!(step.attempts, 3);
        assert_eq!(
            step.states,
            vec![
                StepState::Queued,
                StepState::ResolvingParams,
                StepState::Executing,
                StepState::Retry,
                StepState::Executing,
                StepState::Retry,
                StepState::Executing,
                StepState::Done,
            ]
        );
        let recovered = report.errors().count();
        assert_eq!(recovered, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_critical_step() {
        let strategy = Strategy::new(
            "s",
            vec![Step::new("flaky", "flaky", json!({})).with_retries(1)],
        )
        .unwrap();

        let report = executor(5).run(&strategy, ExecutionContext::new()).await.unwrap();

        assert_eq!(report.state, StrategyState::Failed);
        assert_eq!(report.step("flaky").unwrap().attempts, 2);
        assert!(report.dataset("out").is_none());
    }

    #[tokio::test]
    async fn unknown_action_type_is_validation_failure() {
        let strategy = Strategy::new(
            "s",
            vec![Step::new("missing", "no_such_action", json!({})).critical(false)],
        )
        .unwrap();

        let report = executor(0).run(&strategy, ExecutionContext::new()).await.unwrap();

        assert_eq!(report.state, StrategyState::PartiallySucceeded);
        let step = report.step("missing").unwrap();
        assert_eq!(step.attempts, 0);
        assert_eq!(step.error.as_ref().map(ActionError::kind), Some(ErrorKind::Validation));
    }

    #[test]
    fn with_config_resets_backoff() {
        let config = EngineConfig::default().with_retry(RetryConfig {
            base_delay_ms: 1,
            multiplier: 1.0,
            max_backoff_ms: 1,
            jitter: false,
        });
        let executor = executor(0).with_config(config);
        assert_eq!(executor.backoff.delay(4), Duration::from_millis(1));
    }
}
