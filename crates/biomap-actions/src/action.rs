//! Action contract
//!
//! The executor drives every action the same way: `validate` the resolved
//! parameters against the declared schema, then `execute` with a read-only
//! view of the context. Actions never write to the context; they return an
//! [`ActionResult`] that the executor applies.

use crate::schema::ParamSchema;
use async_trait::async_trait;
use biomap_cache::{CacheError, CacheManager, Resolution, ResolutionSource};
use biomap_core::{
    ActionError, ActionResult, Dataset, ExecutionContext, MappingPath, PathResolver,
};
use biomap_paths::PathFinder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default bound on an action's internal fan-out
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Shared collaborators available to actions
#[derive(Debug, Clone)]
pub struct ActionServices {
    path_finder: Option<Arc<PathFinder>>,
    cache: Option<Arc<CacheManager>>,
    resolver: Option<Arc<dyn PathResolver>>,
    max_concurrency: usize,
}

impl Default for ActionServices {
    fn default() -> Self {
        Self {
            path_finder: None,
            cache: None,
            resolver: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ActionServices {
    /// No collaborators and the default fan-out bound
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the finder used to plan mapping paths
    #[inline]
    #[must_use]
    pub fn with_path_finder(mut self, finder: Arc<PathFinder>) -> Self {
        self.path_finder = Some(finder);
        self
    }

    /// Set the resolution cache shared across steps and runs
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the resolver that walks a path through identifier clients
    #[inline]
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set fan-out bound (at least one)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Copy for a new run: same cache and resolver, fresh path memo
    #[must_use]
    pub fn for_run(&self) -> Self {
        Self {
            path_finder: self
                .path_finder
                .as_ref()
                .map(|finder| Arc::new(finder.for_new_run())),
            ..self.clone()
        }
    }

    /// Configured path finder
    ///
    /// # Errors
    /// [`ActionError::Configuration`] when no path finder is configured.
    pub fn path_finder(&self) -> Result<&PathFinder, ActionError> {
        self.path_finder
            .as_deref()
            .ok_or_else(|| ActionError::configuration("path_finder", "no resource graph configured"))
    }

    /// Configured cache; `None` resolves every identifier upstream
    #[inline]
    #[must_use]
    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_deref()
    }

    /// Configured path resolver
    ///
    /// # Errors
    /// [`ActionError::Configuration`] when no resolver is configured.
    pub fn resolver(&self) -> Result<&dyn PathResolver, ActionError> {
        self.resolver
            .as_deref()
            .ok_or_else(|| ActionError::configuration("resolver", "no identifier clients configured"))
    }

    /// Bound on concurrent resolutions inside one action
    #[inline]
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

/// Per-invocation view handed to an action
#[derive(Debug, Clone)]
pub struct ActionContext<'a> {
    /// Name of the running step
    pub step: &'a str,
    /// Read-only context as left by the previous steps
    pub context: &'a ExecutionContext,
    /// Shared collaborators
    pub services: &'a ActionServices,
    /// Cancelled when the step times out or the run is cancelled
    pub cancel: CancellationToken,
    /// Route resolutions through the cache
    pub cache_results: bool,
    /// 1-based attempt number
    pub attempt: u32,
}

impl<'a> ActionContext<'a> {
    /// First attempt with caching on and a fresh, unfired token
    #[must_use]
    pub fn new(step: &'a str, context: &'a ExecutionContext, services: &'a ActionServices) -> Self {
        Self {
            step,
            context,
            services,
            cancel: CancellationToken::new(),
            cache_results: true,
            attempt: 1,
        }
    }

    /// Replace the cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Toggle routing resolutions through the cache
    #[inline]
    #[must_use]
    pub fn with_cache_results(mut self, cache_results: bool) -> Self {
        self.cache_results = cache_results;
        self
    }

    /// Set the 1-based attempt number
    #[inline]
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Dataset that must exist; `field` names the parameter that referenced it
    ///
    /// # Errors
    /// [`ActionError::Validation`] on `field` when the dataset is missing.
    pub fn dataset(&self, field: &str, key: &str) -> Result<&'a Dataset, ActionError> {
        self.context
            .dataset(key)
            .ok_or_else(|| ActionError::validation(field, format!("dataset '{key}' not found in context")))
    }

    /// Bail out early when cancelled
    ///
    /// # Errors
    /// [`ActionError::Cancelled`] once the token fires.
    pub fn check_cancelled(&self) -> Result<(), ActionError> {
        if self.cancel.is_cancelled() {
            Err(ActionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve one identifier, through the cache unless caching is off
    ///
    /// Retry attempts replace cached upstream failures instead of replaying
    /// them.
    ///
    /// # Errors
    /// Cache and upstream errors; [`CacheError::NoMapping`] is left for the
    /// caller to interpret.
    pub async fn resolve_identifier(
        &self,
        identifier: &str,
        path: &MappingPath,
    ) -> Result<Result<Resolution, CacheError>, ActionError> {
        let resolver = self.services.resolver()?;
        let resolution = match (self.services.cache(), self.cache_results) {
            (Some(cache), true) if self.attempt > 1 => {
                cache
                    .resolve_refreshing_failures(identifier, path, resolver)
                    .await
            }
            (Some(cache), true) => cache.resolve(identifier, path, resolver).await,
            (Some(cache), false) => cache.resolve_uncached(identifier, path, resolver).await,
            (None, _) => resolver
                .resolve_path(identifier, path)
                .await
                .map(|targets| Resolution {
                    targets,
                    source: ResolutionSource::Uncached,
                })
                .map_err(|err| CacheError::Upstream {
                    identifier: identifier.to_string(),
                    message: err.message,
                }),
        };
        Ok(resolution)
    }
}

/// Object-safe action handler
#[async_trait]
pub trait Action: Send + Sync + fmt::Debug {
    /// Registry name
    fn action_type(&self) -> &str;

    /// Declared parameters, checked by the default `validate`
    fn schema(&self) -> ParamSchema;

    /// Validate resolved parameters; runs strictly before `execute`
    ///
    /// # Errors
    /// [`ActionError::Validation`] naming the offending field.
    fn validate(&self, params: &Value) -> Result<Value, ActionError> {
        self.schema().validate(params).map(Value::Object)
    }

    /// Run the action with validated parameters
    async fn execute(
        &self,
        params: Value,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError>;
}

/// Action with a strongly typed parameter struct
///
/// Register through [`TypedActionAdapter`], which validates against the
/// schema and deserializes `Params` before calling [`TypedAction::run`].
#[async_trait]
pub trait TypedAction: Send + Sync + fmt::Debug + 'static {
    /// Deserialized from the validated parameter object
    type Params: DeserializeOwned + Send;

    /// Registry name
    const ACTION_TYPE: &'static str;

    /// Declared parameters
    fn schema() -> ParamSchema;

    /// Run with typed parameters
    async fn run(
        &self,
        params: Self::Params,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError>;
}

/// Adapts a [`TypedAction`] to [`Action`]
#[derive(Debug)]
pub struct TypedActionAdapter<A> {
    inner: A,
    _params: PhantomData<fn() -> A>,
}

impl<A: TypedAction> TypedActionAdapter<A> {
    /// Wrap a typed action
    #[inline]
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            _params: PhantomData,
        }
    }

    /// Wrapped typed action
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: TypedAction> Action for TypedActionAdapter<A> {
    fn action_type(&self) -> &str {
        A::ACTION_TYPE
    }

    fn schema(&self) -> ParamSchema {
        A::schema()
    }

    async fn execute(
        &self,
        params: Value,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        let typed: A::Params = serde_json::from_value(params)
            .map_err(|e| ActionError::validation("params", e.to_string()))?;
        self.inner.run(typed, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamField, ParamKind};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Echo;

    #[derive(Debug, Deserialize)]
    struct EchoParams {
        output_key: String,
        value: String,
    }

    #[async_trait]
    impl TypedAction for Echo {
        type Params = EchoParams;
        const ACTION_TYPE: &'static str = "echo";

        fn schema() -> ParamSchema {
            ParamSchema::new()
                .field(ParamField::required("output_key", ParamKind::String))
                .field(ParamField::optional("value", ParamKind::String).with_default("hi"))
        }

        async fn run(
            &self,
            params: EchoParams,
            _ctx: ActionContext<'_>,
        ) -> Result<ActionResult, ActionError> {
            Ok(ActionResult::success().with_output(
                params.output_key,
                Dataset::from_column("value", [params.value]),
            ))
        }
    }

    #[tokio::test]
    async fn typed_adapter_validates_then_runs() {
        let action = TypedActionAdapter::new(Echo);
        assert_eq!(action.action_type(), "echo");

        let validated = action.validate(&json!({"output_key": "out"})).unwrap();
        let context = ExecutionContext::new();
        let services = ActionServices::new();
        let result = action
            .execute(validated, ActionContext::new("s", &context, &services))
            .await
            .unwrap();
        assert_eq!(result.outputs["out"].rows()[0]["value"], json!("hi"));
    }

    #[test]
    fn typed_adapter_validation_names_field() {
        let action = TypedActionAdapter::new(Echo);
        let err = action.validate(&json!({"value": "x"})).unwrap_err();
        assert!(matches!(err, ActionError::Validation { ref field, .. } if field == "output_key"));
    }

    #[test]
    fn missing_services_are_configuration_errors() {
        let services = ActionServices::new();
        assert!(services.path_finder().unwrap_err().is_fatal());
        assert!(services.resolver().unwrap_err().is_fatal());
    }

    #[test]
    fn missing_dataset_is_validation_error() {
        let context = ExecutionContext::new();
        let services = ActionServices::new();
        let ctx = ActionContext::new("s", &context, &services);
        let err = ctx.dataset("input_key", "proteins").unwrap_err();
        assert_eq!(err.kind(), biomap_core::ErrorKind::Validation);
    }

    #[test]
    fn cancellation_is_observed() {
        let context = ExecutionContext::new();
        let services = ActionServices::new();
        let ctx = ActionContext::new("s", &context, &services);
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel.cancel();
        assert_eq!(ctx.check_cancelled(), Err(ActionError::Cancelled));
    }
}
