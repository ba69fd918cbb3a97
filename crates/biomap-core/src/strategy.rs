//! Strategy and step definitions
//!
//! A [`Strategy`] is loaded once per run and never mutated. Step names are
//! unique within a strategy; both constructors and deserialization enforce it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

/// Error building or parsing a strategy
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// Strategy name is blank
    #[error("strategy name must not be empty")]
    EmptyName,

    /// Step name is blank
    #[error("step name must not be empty (position {position})")]
    EmptyStepName { position: usize },

    /// Two steps share a name
    #[error("duplicate step name: {0}")]
    DuplicateStepName(String),

    /// YAML or JSON could not be decoded
    #[error("failed to parse strategy document: {0}")]
    Parse(String),
}

/// Per-step execution policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepMetadata {
    /// Failure halts the strategy when true
    pub critical: bool,
    /// Timeout in seconds; engine default applies when unset
    pub timeout: Option<f64>,
    /// Extra attempts after the first for retryable errors
    pub retry_count: u32,
    /// Route identifier resolutions through the cache
    pub cache_results: bool,
}

impl Default for StepMetadata {
    fn default() -> Self {
        Self {
            critical: true,
            timeout: None,
            retry_count: 0,
            cache_results: true,
        }
    }
}

impl StepMetadata {
    /// Timeout as a duration; non-positive or non-finite values mean none
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Action type plus its raw (unresolved) parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Registry name
    #[serde(rename = "type")]
    pub action_type: String,
    /// Parameters before placeholder resolution
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One typed operation within a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the strategy
    pub name: String,
    /// Action to run
    pub action: ActionSpec,
    /// Failure, retry and caching policy
    #[serde(default)]
    pub metadata: StepMetadata,
}

impl Step {
    /// Create critical step with default metadata
    #[must_use]
    pub fn new(name: impl Into<String>, action_type: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            action: ActionSpec {
                action_type: action_type.into(),
                params,
            },
            metadata: StepMetadata::default(),
        }
    }

    /// Set whether a failure halts the run
    #[inline]
    #[must_use]
    pub fn critical(mut self, critical: bool) -> Self {
        self.metadata.critical = critical;
        self
    }

    /// Set how many times an execution error is retried
    #[inline]
    #[must_use]
    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.metadata.retry_count = retry_count;
        self
    }

    /// Bound each attempt
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.metadata.timeout = Some(timeout.as_secs_f64());
        self
    }

    /// Toggle routing resolutions through the cache
    #[inline]
    #[must_use]
    pub fn with_cache_results(mut self, cache_results: bool) -> Self {
        self.metadata.cache_results = cache_results;
        self
    }

    /// Registry name of the step's action
    #[inline]
    #[must_use]
    pub fn action_type(&self) -> &str {
        &self.action.action_type
    }
}

#[derive(Deserialize)]
struct RawStrategy {
    name: String,
    #[serde(default)]
    description: Option<String>,
    steps: Vec<Step>,
}

/// Named, ordered pipeline of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStrategy")]
pub struct Strategy {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    steps: Vec<Step>,
}

impl TryFrom<RawStrategy> for Strategy {
    type Error = StrategyError;

    fn try_from(raw: RawStrategy) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.steps).map(|s| s.with_description_opt(raw.description))
    }
}

impl Strategy {
    /// Create strategy, validating names
    ///
    /// # Errors
    /// Returns an error if the strategy or any step name is empty, or if two
    /// steps share a name.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self, StrategyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StrategyError::EmptyName);
        }
        let mut seen = HashSet::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(StrategyError::EmptyStepName { position });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(StrategyError::DuplicateStepName(step.name.clone()));
            }
        }
        Ok(Self {
            name,
            description: None,
            steps,
        })
    }

    /// Parse a YAML strategy document
    ///
    /// # Errors
    /// Returns [`StrategyError::Parse`] for malformed documents and the name
    /// validation errors of [`Strategy::new`].
    pub fn from_yaml_str(document: &str) -> Result<Self, StrategyError> {
        serde_yaml::from_str::<RawStrategy>(document)
            .map_err(|e| StrategyError::Parse(e.to_string()))
            .and_then(Self::try_from)
    }

    /// Parse a JSON strategy document
    ///
    /// # Errors
    /// Same as [`Strategy::from_yaml_str`].
    pub fn from_json_str(document: &str) -> Result<Self, StrategyError> {
        serde_json::from_str::<RawStrategy>(document)
            .map_err(|e| StrategyError::Parse(e.to_string()))
            .and_then(Self::try_from)
    }

    /// Attach a description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn with_description_opt(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Strategy name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-text description
    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Steps in execution order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step called `name`
    #[inline]
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// No steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
