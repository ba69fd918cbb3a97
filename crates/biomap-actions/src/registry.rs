//! Action registry
//!
//! Static table from action-type name to handler factory, built once at
//! process start and shared read-only by every run.

use crate::action::{Action, TypedAction, TypedActionAdapter};
use crate::builtin;
use biomap_core::ActionError;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Produces a handler instance for one step invocation
pub type ActionFactory = Arc<dyn Fn() -> Arc<dyn Action> + Send + Sync>;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name already taken; registration is first-wins
    #[error("action type already registered: {0}")]
    DuplicateActionType(String),

    /// No handler under this name
    #[error("unknown action type: {0}")]
    UnknownActionType(String),
}

impl From<RegistryError> for ActionError {
    fn from(err: RegistryError) -> Self {
        ActionError::validation("action.type", err.to_string())
    }
}

/// Registry of action handler factories
#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: IndexMap<String, ActionFactory>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("action_types", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with built-in actions
    #[must_use]
    pub fn with_defaults() -> Self {
        let factories = builtin::builtin_factories()
            .into_iter()
            .map(|(name, factory)| (name.to_string(), factory))
            .collect();
        Self { factories }
    }

    /// Register a factory
    ///
    /// # Errors
    /// [`RegistryError::DuplicateActionType`] if the name is taken.
    pub fn register<F>(&mut self, action_type: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Arc<dyn Action> + Send + Sync + 'static,
    {
        self.insert(action_type, Arc::new(factory), false)
    }

    /// Register a factory, replacing an existing one only when
    /// `allow_override` is set
    ///
    /// # Errors
    /// [`RegistryError::DuplicateActionType`] if the name is taken and
    /// overriding is not allowed.
    pub fn insert(
        &mut self,
        action_type: impl Into<String>,
        factory: ActionFactory,
        allow_override: bool,
    ) -> Result<(), RegistryError> {
        let action_type = action_type.into();
        if !allow_override && self.factories.contains_key(&action_type) {
            return Err(RegistryError::DuplicateActionType(action_type));
        }
        tracing::debug!(action_type = %action_type, allow_override, "action registered");
        self.factories.insert(action_type, factory);
        Ok(())
    }

    /// Register a typed action under its `ACTION_TYPE`
    ///
    /// # Errors
    /// [`RegistryError::DuplicateActionType`] if the name is taken.
    pub fn register_typed<A>(&mut self) -> Result<(), RegistryError>
    where
        A: TypedAction + Default,
    {
        self.register(A::ACTION_TYPE, || {
            Arc::new(TypedActionAdapter::new(A::default())) as Arc<dyn Action>
        })
    }

    /// Instantiate the handler for an action type
    ///
    /// # Errors
    /// [`RegistryError::UnknownActionType`] if nothing is registered.
    pub fn create(&self, action_type: &str) -> Result<Arc<dyn Action>, RegistryError> {
        self.factories
            .get(action_type)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownActionType(action_type.to_string()))
    }

    /// Check if action type exists
    #[inline]
    #[must_use]
    pub fn contains(&self, action_type: &str) -> bool {
        self.factories.contains_key(action_type)
    }

    /// Remove action type
    #[inline]
    pub fn remove(&mut self, action_type: &str) -> bool {
        self.factories.shift_remove(action_type).is_some()
    }

    /// Registered names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Get number of registered action types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionContext;
    use crate::schema::ParamSchema;
    use async_trait::async_trait;
    use biomap_core::ActionResult;
    use serde_json::Value;

    #[derive(Debug)]
    struct Noop(&'static str);

    #[async_trait]
    impl Action for Noop {
        fn action_type(&self) -> &str {
            self.0
        }

        fn schema(&self) -> ParamSchema {
            ParamSchema::new()
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: ActionContext<'_>,
        ) -> Result<ActionResult, ActionError> {
            Ok(ActionResult::success())
        }
    }

    #[test]
    fn registry_new_empty() {
        let registry = ActionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registry_with_defaults() {
        let registry = ActionRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "load_identifiers",
                "apply_mapping_table",
                "map_identifiers",
                "merge_datasets",
                "filter_dataset",
                "calculate_overlap",
            ]
        );
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ActionRegistry::new();
        registry.register("noop", || Arc::new(Noop("a")) as Arc<dyn Action>).unwrap();
        let err = registry
            .register("noop", || Arc::new(Noop("b")) as Arc<dyn Action>)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateActionType("noop".into()));
        assert_eq!(registry.create("noop").unwrap().action_type(), "a");
    }

    #[test]
    fn override_replaces_factory() {
        let mut registry = ActionRegistry::new();
        registry.register("noop", || Arc::new(Noop("a")) as Arc<dyn Action>).unwrap();
        registry
            .insert("noop", Arc::new(|| Arc::new(Noop("b")) as Arc<dyn Action>), true)
            .unwrap();
        assert_eq!(registry.create("noop").unwrap().action_type(), "b");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_type_maps_to_validation_error() {
        let registry = ActionRegistry::new();
        let err: ActionError = registry.create("missing").unwrap_err().into();
        assert!(matches!(err, ActionError::Validation { ref field, .. } if field == "action.type"));
    }

    #[test]
    fn registry_remove() {
        let mut registry = ActionRegistry::with_defaults();
        assert!(registry.remove("filter_dataset"));
        assert!(!registry.contains("filter_dataset"));
        assert!(!registry.remove("filter_dataset"));
    }
}
