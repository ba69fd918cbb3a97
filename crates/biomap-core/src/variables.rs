//! Variable providers
//!
//! Supply external configuration values (directories, thresholds) referenced
//! from step parameters as `${name}`.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Source of named configuration values
pub trait VariableProvider: Send + Sync + fmt::Debug {
    /// Look up a variable; `None` when undefined
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// In-memory variables
#[derive(Debug, Clone, Default)]
pub struct MapVariables {
    values: HashMap<String, Value>,
}

impl MapVariables {
    /// No variables defined
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name`
    #[inline]
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Define or redefine `name`
    #[inline]
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }
}

impl VariableProvider for MapVariables {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

/// Process environment, optionally namespaced by a prefix
///
/// With prefix `BIOMAP_`, `${data_dir}` reads `BIOMAP_DATA_DIR`.
#[derive(Debug, Clone, Default)]
pub struct EnvVariables {
    prefix: Option<String>,
}

impl EnvVariables {
    /// Reads variable names as-is
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `<prefix><NAME>`
    #[inline]
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn env_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{}", name.to_uppercase()),
            None => name.to_string(),
        }
    }
}

impl VariableProvider for EnvVariables {
    fn resolve(&self, name: &str) -> Option<Value> {
        std::env::var(self.env_name(name)).ok().map(Value::String)
    }
}

/// Ordered stack of providers; the first one that knows a name wins
#[derive(Debug, Clone, Default)]
pub struct LayeredVariables {
    layers: Vec<Arc<dyn VariableProvider>>,
}

impl LayeredVariables {
    /// No layers; every name is undefined
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer below the existing ones
    #[inline]
    #[must_use]
    pub fn with_layer(mut self, provider: Arc<dyn VariableProvider>) -> Self {
        self.layers.push(provider);
        self
    }
}

impl VariableProvider for LayeredVariables {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.layers.iter().find_map(|layer| layer.resolve(name))
    }
}
