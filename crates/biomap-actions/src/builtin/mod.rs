//! Built-in actions

mod filter;
mod load;
mod map_identifiers;
mod mapping_table;
mod merge;
mod overlap;

pub use filter::{FilterDataset, FilterDatasetParams};
pub use load::{LoadIdentifiers, LoadIdentifiersParams};
pub use map_identifiers::{MapIdentifiers, MapIdentifiersParams};
pub use mapping_table::{ApplyMappingTable, ApplyMappingTableParams};
pub use merge::{JoinKind, MergeDatasets, MergeDatasetsParams};
pub use overlap::{CalculateOverlap, CalculateOverlapParams};

use crate::action::{Action, TypedAction, TypedActionAdapter};
use crate::registry::{ActionFactory, ActionRegistry, RegistryError};
use serde_json::Value;
use std::sync::Arc;

fn typed<A: TypedAction + Default>() -> (&'static str, ActionFactory) {
    let factory: ActionFactory =
        Arc::new(|| Arc::new(TypedActionAdapter::new(A::default())) as Arc<dyn Action>);
    (A::ACTION_TYPE, factory)
}

/// Factories for every built-in action, in registration order
#[must_use]
pub fn builtin_factories() -> Vec<(&'static str, ActionFactory)> {
    vec![
        typed::<LoadIdentifiers>(),
        typed::<ApplyMappingTable>(),
        typed::<MapIdentifiers>(),
        typed::<MergeDatasets>(),
        typed::<FilterDataset>(),
        typed::<CalculateOverlap>(),
    ]
}

/// Add the built-ins to an existing registry
///
/// # Errors
/// [`RegistryError::DuplicateActionType`] if a built-in name is already taken.
pub fn register_builtins(registry: &mut ActionRegistry) -> Result<(), RegistryError> {
    for (name, factory) in builtin_factories() {
        registry.insert(name, factory, false)?;
    }
    Ok(())
}

/// Text key for joins and set operations; nulls have no key
pub(crate) fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Keys of a cell, flattening one level of arrays
pub(crate) fn cell_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_key).collect(),
        other => value_key(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_ignore_nulls_and_flatten_arrays() {
        assert_eq!(value_key(&json!("P1")), Some("P1".to_string()));
        assert_eq!(value_key(&json!(42)), Some("42".to_string()));
        assert_eq!(value_key(&Value::Null), None);
        assert_eq!(cell_keys(&json!(["a", null, 3])), vec!["a", "3"]);
        assert!(cell_keys(&Value::Null).is_empty());
    }

    #[test]
    fn builtins_register_once() {
        let mut registry = ActionRegistry::new();
        register_builtins(&mut registry).unwrap();
        assert_eq!(registry.len(), builtin_factories().len());
        assert!(matches!(
            register_builtins(&mut registry),
            Err(RegistryError::DuplicateActionType(_))
        ));
    }
}
