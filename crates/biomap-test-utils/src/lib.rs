//! Testing utilities for biomap workspace
//!
//! Shared fixtures: scripted identifier clients and path resolvers that count
//! their calls, resource graph builders, controllable actions and a collecting
//! reporter.

#![allow(missing_docs)]

use async_trait::async_trait;
use biomap_actions::{Action, ActionContext, ActionRegistry, ActionServices, ParamField, ParamKind, ParamSchema};
use biomap_cache::{CacheManager, CachePolicy, MemoryCacheStore};
use biomap_core::{
    ActionError, ActionResult, ClientError, Dataset, IdentifierClient, MappedTarget, MappingPath,
    MappingResource, PathResolver,
};
use biomap_engine::{Reporter, RunReport};
use biomap_paths::{PathFinder, ResourceGraph};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Targets with full confidence
pub fn exact(targets: &[&str]) -> Vec<MappedTarget> {
    targets.iter().map(|t| MappedTarget::exact(*t)).collect()
}

/// Identifier client answering from a fixed table
///
/// Unknown identifiers resolve to nothing; identifiers marked with
/// [`StaticClient::failing_on`] return a [`ClientError`], and those marked
/// with [`StaticClient::failing_first`] do so only for their first calls.
#[derive(Debug, Default)]
pub struct StaticClient {
    table: HashMap<String, Vec<MappedTarget>>,
    failing: HashSet<String>,
    failing_first: HashMap<String, usize>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(self, identifier: &str, targets: &[&str]) -> Self {
        self.with_targets(identifier, exact(targets))
    }

    pub fn with_targets(mut self, identifier: &str, targets: Vec<MappedTarget>) -> Self {
        self.table.insert(identifier.to_string(), targets);
        self
    }

    pub fn failing_on(mut self, identifier: &str) -> Self {
        self.failing.insert(identifier.to_string());
        self
    }

    /// Fail the first `times` calls for `identifier`, then answer normally
    pub fn failing_first(mut self, identifier: &str, times: usize) -> Self {
        self.failing_first.insert(identifier.to_string(), times);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn calls_for(&self, identifier: &str) -> usize {
        self.calls.lock().get(identifier).copied().unwrap_or(0)
    }
}

fn record_call(calls: &Mutex<HashMap<String, usize>>, identifier: &str) -> usize {
    let mut calls = calls.lock();
    let count = calls.entry(identifier.to_string()).or_default();
    *count += 1;
    *count
}

fn scripted_answer(
    table: &HashMap<String, Vec<MappedTarget>>,
    failing: &HashSet<String>,
    failing_first: &HashMap<String, usize>,
    identifier: &str,
    call: usize,
) -> Result<Vec<MappedTarget>, ClientError> {
    let transient = failing_first.get(identifier).is_some_and(|times| call <= *times);
    if transient || failing.contains(identifier) {
        return Err(ClientError::new(format!("upstream rejected '{identifier}'")));
    }
    Ok(table.get(identifier).cloned().unwrap_or_default())
}

#[async_trait]
impl IdentifierClient for StaticClient {
    async fn resolve(&self, identifier: &str, _params: &Value) -> Result<Vec<MappedTarget>, ClientError> {
        let call = record_call(&self.calls, identifier);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        scripted_answer(&self.table, &self.failing, &self.failing_first, identifier, call)
    }
}

/// Path resolver answering from a fixed table, counting calls per identifier
#[derive(Debug, Default)]
pub struct CountingResolver {
    table: HashMap<String, Vec<MappedTarget>>,
    failing: HashSet<String>,
    failing_first: HashMap<String, usize>,
    delay: Option<Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, identifier: &str, targets: &[&str]) -> Self {
        self.table.insert(identifier.to_string(), exact(targets));
        self
    }

    pub fn failing_on(mut self, identifier: &str) -> Self {
        self.failing.insert(identifier.to_string());
        self
    }

    /// Fail the first `times` calls for `identifier`, then answer normally
    pub fn failing_first(mut self, identifier: &str, times: usize) -> Self {
        self.failing_first.insert(identifier.to_string(), times);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total upstream calls
    pub fn calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn calls_for(&self, identifier: &str) -> usize {
        self.calls.lock().get(identifier).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PathResolver for CountingResolver {
    async fn resolve_path(
        &self,
        identifier: &str,
        _path: &MappingPath,
    ) -> Result<Vec<MappedTarget>, ClientError> {
        let call = record_call(&self.calls, identifier);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        scripted_answer(&self.table, &self.failing, &self.failing_first, identifier, call)
    }
}

/// Path through `(resource id, source type, target type)` hops
pub fn linear_path(hops: &[(&str, &str, &str)]) -> MappingPath {
    MappingPath::from_chain(
        hops.iter()
            .map(|(id, source, target)| MappingResource::new(*id, *source, *target))
            .collect(),
    )
    .expect("hops must form a connected chain")
}

/// Graph registering resources in the given order
pub fn resource_graph(resources: Vec<MappingResource>) -> Arc<ResourceGraph> {
    Arc::new(ResourceGraph::from_resources(resources).expect("unique resource ids"))
}

/// In-memory cache manager with the given policy
pub fn memory_cache(policy: CachePolicy) -> Arc<CacheManager> {
    Arc::new(CacheManager::new(Arc::new(MemoryCacheStore::default()), policy))
}

/// Services wired to a graph over `resources`, the given resolver and a
/// default in-memory cache
pub fn services(resources: Vec<MappingResource>, resolver: Arc<dyn PathResolver>) -> ActionServices {
    ActionServices::new()
        .with_path_finder(Arc::new(PathFinder::new(resource_graph(resources))))
        .with_cache(memory_cache(CachePolicy::default()))
        .with_resolver(resolver)
}

/// Register a shared action instance under its own type name
pub fn register_shared<A: Action + 'static>(registry: &mut ActionRegistry, action: Arc<A>) {
    let name = action.action_type().to_string();
    registry
        .register(name, move || Arc::clone(&action) as Arc<dyn Action>)
        .expect("action type not yet registered");
}

fn output_schema() -> ParamSchema {
    ParamSchema::new()
        .field(ParamField::optional("output_key", ParamKind::String))
        .field(ParamField::optional("value", ParamKind::Any))
}

fn output_result(params: &Value, step: &str) -> ActionResult {
    let mut result = ActionResult::success().with_statistic("value", params.get("value").cloned().unwrap_or(Value::Null));
    if let Some(key) = params.get("output_key").and_then(Value::as_str) {
        result = result.with_output(key, Dataset::from_column("step", [step]));
    }
    result
}

/// Fails with an execution error for its first `fail_times` calls
#[derive(Debug)]
pub struct FlakyAction {
    fail_times: usize,
    calls: AtomicUsize,
}

impl FlakyAction {
    pub fn new(fail_times: usize) -> Self {
        Self {
            fail_times,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for FlakyAction {
    fn action_type(&self) -> &str {
        "flaky"
    }

    fn schema(&self) -> ParamSchema {
        output_schema()
    }

    async fn execute(&self, params: Value, ctx: ActionContext<'_>) -> Result<ActionResult, ActionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            return Err(ActionError::execution(format!("transient failure on call {}", call + 1)));
        }
        Ok(output_result(&params, ctx.step))
    }
}

/// Always fails with a fixed error
#[derive(Debug)]
pub struct FailingAction {
    error: ActionError,
    calls: AtomicUsize,
}

impl FailingAction {
    pub fn new(error: ActionError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for FailingAction {
    fn action_type(&self) -> &str {
        "failing"
    }

    fn schema(&self) -> ParamSchema {
        output_schema()
    }

    async fn execute(&self, _params: Value, _ctx: ActionContext<'_>) -> Result<ActionResult, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Sleeps for a fixed duration unless its cancellation token fires first
#[derive(Debug)]
pub struct SlowAction {
    duration: Duration,
    started: AtomicUsize,
    observed_cancel: Arc<AtomicBool>,
}

impl SlowAction {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: AtomicUsize::new(0),
            observed_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether a spawned sub-task saw its token cancelled
    pub fn observed_cancel(&self) -> bool {
        self.observed_cancel.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for SlowAction {
    fn action_type(&self) -> &str {
        "slow"
    }

    fn schema(&self) -> ParamSchema {
        output_schema()
    }

    async fn execute(&self, params: Value, ctx: ActionContext<'_>) -> Result<ActionResult, ActionError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let token = ctx.cancel.clone();
        let observed = Arc::clone(&self.observed_cancel);
        let duration = self.duration;
        // sub-task outlives the action future if the executor drops it
        let worker = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    observed.store(true, Ordering::SeqCst);
                    true
                }
                () = tokio::time::sleep(duration) => false,
            }
        });
        match worker.await {
            Ok(true) => Err(ActionError::Cancelled),
            Ok(false) => Ok(output_result(&params, ctx.step)),
            Err(err) => Err(ActionError::execution(err.to_string())),
        }
    }
}

/// What [`RecordingAction`] saw when it ran
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub step: String,
    pub datasets: Vec<String>,
    pub params: Value,
}

/// Records the datasets visible to it and the params it received
#[derive(Debug, Default)]
pub struct RecordingAction {
    seen: Mutex<Vec<Observation>>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Action for RecordingAction {
    fn action_type(&self) -> &str {
        "record"
    }

    fn schema(&self) -> ParamSchema {
        output_schema()
    }

    async fn execute(&self, params: Value, ctx: ActionContext<'_>) -> Result<ActionResult, ActionError> {
        self.seen.lock().push(Observation {
            step: ctx.step.to_string(),
            datasets: ctx.context.dataset_keys().map(str::to_string).collect(),
            params: params.clone(),
        });
        Ok(output_result(&params, ctx.step))
    }
}

/// Keeps every report it receives
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<RunReport>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.reports.lock().clone()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, report: &RunReport) {
        self.reports.lock().push(report.clone());
    }
}
