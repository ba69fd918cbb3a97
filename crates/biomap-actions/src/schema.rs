//! Parameter schemas
//!
//! Every action declares the fields it accepts. Validation applies defaults,
//! rejects unknown fields and checks types, always naming the offending field.

use biomap_core::ActionError;
use serde_json::{Map, Value};
use std::fmt;

/// Expected semantic type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// JSON string
    String,
    /// Any JSON integer
    Integer,
    /// Integer that is zero or positive (counts, bounds)
    UnsignedInteger,
    /// Any JSON number
    Float,
    /// JSON boolean
    Bool,
    /// Array of strings
    StringList,
    /// JSON object
    Object,
    /// Anything but a missing value
    Any,
}

impl ParamKind {
    /// Check whether a value has this kind
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::UnsignedInteger => value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::UnsignedInteger => "non-negative integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::StringList => "list of strings",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamField {
    /// Key in the parameter object
    pub name: String,
    /// Accepted JSON shape
    pub kind: ParamKind,
    /// Absent or null is a validation error
    pub required: bool,
    /// Filled in when absent or null
    pub default: Option<Value>,
    /// Human-readable help
    pub description: Option<String>,
}

impl ParamField {
    /// Required field
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: None,
        }
    }

    /// Optional field without default
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Default applied when the field is absent or null
    #[inline]
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    /// Attach help text
    #[inline]
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declared parameters of an action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    fields: Vec<ParamField>,
}

impl ParamSchema {
    /// Schema with no fields; every key is rejected
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one more field
    #[inline]
    #[must_use]
    pub fn field(mut self, field: ParamField) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields in declaration order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[ParamField] {
        &self.fields
    }

    /// Field declared under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate parameters, returning them with defaults applied
    ///
    /// # Errors
    /// [`ActionError::Validation`] naming the first offending field.
    pub fn validate(&self, params: &Value) -> Result<Map<String, Value>, ActionError> {
        let provided = match params {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ActionError::validation(
                    "params",
                    format!("expected an object, got {}", describe_value(other)),
                ))
            }
        };

        if let Some(unknown) = provided.keys().find(|name| self.get(name).is_none()) {
            return Err(ActionError::validation(unknown.clone(), "unknown field"));
        }

        let mut validated = Map::new();
        for field in &self.fields {
            let value = match provided.get(&field.name) {
                Some(value) if !value.is_null() => value.clone(),
                _ => match (&field.default, field.required) {
                    (Some(default), _) => default.clone(),
                    (None, true) => {
                        return Err(ActionError::validation(
                            field.name.clone(),
                            "required field missing",
                        ))
                    }
                    (None, false) => continue,
                },
            };

            if !field.kind.matches(&value) {
                return Err(ActionError::validation(
                    field.name.clone(),
                    format!("expected {}, got {}", field.kind, describe_value(&value)),
                ));
            }
            validated.insert(field.name.clone(), value);
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("input_key", ParamKind::String))
            .field(ParamField::optional("limit", ParamKind::Integer))
            .field(ParamField::optional("column", ParamKind::String).with_default("identifier"))
            .field(ParamField::optional("threshold", ParamKind::Float).with_default(0.5))
            .field(ParamField::optional("ids", ParamKind::StringList))
            .field(ParamField::optional("batch", ParamKind::UnsignedInteger))
    }

    fn field_of(err: ActionError) -> String {
        match err {
            ActionError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_applied() {
        let validated = schema().validate(&json!({"input_key": "ids"})).unwrap();
        assert_eq!(
            Value::Object(validated),
            json!({"input_key": "ids", "column": "identifier", "threshold": 0.5})
        );
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = schema().validate(&json!({"limit": 3})).unwrap_err();
        assert_eq!(field_of(err), "input_key");
    }

    #[test]
    fn type_mismatch_is_named() {
        let err = schema()
            .validate(&json!({"input_key": "x", "limit": "ten"}))
            .unwrap_err();
        assert!(err.to_string().contains("expected integer, got string"));
        assert_eq!(field_of(err), "limit");

        let err = schema()
            .validate(&json!({"input_key": "x", "ids": ["a", 1]}))
            .unwrap_err();
        assert_eq!(field_of(err), "ids");
    }

    #[test]
    fn negative_count_is_named() {
        let err = schema()
            .validate(&json!({"input_key": "x", "batch": -1}))
            .unwrap_err();
        assert!(err.to_string().contains("expected non-negative integer, got integer"));
        assert_eq!(field_of(err), "batch");

        let validated = schema()
            .validate(&json!({"input_key": "x", "batch": 0, "limit": -1}))
            .unwrap();
        assert_eq!(validated["batch"], json!(0));
    }

    #[test]
    fn unknown_field_rejected() {
        let err = schema()
            .validate(&json!({"input_key": "x", "colum": "typo"}))
            .unwrap_err();
        assert_eq!(field_of(err), "colum");
    }

    #[test]
    fn integers_are_valid_floats() {
        let validated = schema()
            .validate(&json!({"input_key": "x", "threshold": 1}))
            .unwrap();
        assert_eq!(validated["threshold"], json!(1));
    }

    #[test]
    fn non_object_params_rejected() {
        let err = schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(field_of(err), "params");
    }
}
