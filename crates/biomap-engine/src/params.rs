//! Parameter resolution
//!
//! Step parameters may carry `${...}` placeholders:
//!
//! | placeholder | resolves to |
//! |---|---|
//! | `${name}` | variable from the configured [`VariableProvider`] |
//! | `${name:-fallback}` | the variable, or `fallback` when undefined |
//! | `${steps.<step>.<statistic>}` | a statistic recorded by an earlier step |
//! | `${datasets.<key>.row_count}` | row count of a dataset in the context |
//!
//! Resolution runs in two passes: variables first, then context references,
//! so a variable's value may itself contain a context reference. A string
//! that is exactly one placeholder takes the referenced value as-is (numbers
//! stay numbers); placeholders embedded in longer text are interpolated.
//! Anything left unresolved is a [`ActionError::Configuration`].

use biomap_core::{ActionError, ExecutionContext, MapVariables, VariableProvider};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::Arc;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex"));

const STEPS_PREFIX: &str = "steps.";
const DATASETS_PREFIX: &str = "datasets.";
const ROW_COUNT_SUFFIX: &str = "row_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Variables,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reference<'a> {
    Variable(&'a str),
    StepStatistic { step: &'a str, statistic: &'a str },
    DatasetRowCount(&'a str),
}

#[derive(Debug, Clone, Copy)]
struct Placeholder<'a> {
    expr: &'a str,
    reference: Reference<'a>,
    fallback: Option<&'a str>,
}

impl<'a> Placeholder<'a> {
    fn parse(expr: &'a str) -> Result<Self, ActionError> {
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (expr.trim(), None),
        };
        if name.is_empty() {
            return Err(ActionError::configuration(expr, "empty placeholder"));
        }

        let reference = if let Some(rest) = name.strip_prefix(STEPS_PREFIX) {
            let (step, statistic) = rest
                .split_once('.')
                .filter(|(step, statistic)| !step.is_empty() && !statistic.is_empty())
                .ok_or_else(|| {
                    ActionError::configuration(name, "expected steps.<step>.<statistic>")
                })?;
            Reference::StepStatistic { step, statistic }
        } else if let Some(rest) = name.strip_prefix(DATASETS_PREFIX) {
            let key = rest
                .strip_suffix(ROW_COUNT_SUFFIX)
                .and_then(|key| key.strip_suffix('.'))
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    ActionError::configuration(name, "expected datasets.<key>.row_count")
                })?;
            Reference::DatasetRowCount(key)
        } else {
            Reference::Variable(name)
        };

        Ok(Self {
            expr,
            reference,
            fallback,
        })
    }

    fn name(&self) -> &'a str {
        match self.expr.split_once(":-") {
            Some((name, _)) => name.trim(),
            None => self.expr.trim(),
        }
    }
}

/// Substitutes variables and context references into step parameters
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    variables: Arc<dyn VariableProvider>,
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self::new(Arc::new(MapVariables::new()))
    }
}

impl ParameterResolver {
    /// Resolver over `variables`
    #[inline]
    #[must_use]
    pub fn new(variables: Arc<dyn VariableProvider>) -> Self {
        Self { variables }
    }

    /// Provider consulted for `${name}` placeholders
    #[inline]
    #[must_use]
    pub fn variables(&self) -> &Arc<dyn VariableProvider> {
        &self.variables
    }

    /// Resolve every placeholder in `params` against the variables and the
    /// context as it stands before the step runs
    ///
    /// # Errors
    /// [`ActionError::Configuration`] naming the first placeholder that cannot
    /// be resolved.
    pub fn resolve(&self, params: &Value, context: &ExecutionContext) -> Result<Value, ActionError> {
        let substituted = self.walk(params, Pass::Variables, context)?;
        self.walk(&substituted, Pass::Context, context)
    }

    fn walk(&self, value: &Value, pass: Pass, context: &ExecutionContext) -> Result<Value, ActionError> {
        match value {
            Value::String(text) => self.substitute(text, pass, context),
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, pass, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => fields
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.walk(item, pass, context)?)))
                .collect::<Result<serde_json::Map<_, _>, ActionError>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn substitute(&self, text: &str, pass: Pass, context: &ExecutionContext) -> Result<Value, ActionError> {
        let Some(first) = PLACEHOLDER.captures(text) else {
            return Ok(Value::String(text.to_string()));
        };

        if whole_match(&first, text) {
            let placeholder = Placeholder::parse(&first[1])?;
            return Ok(self
                .lookup(&placeholder, pass, context)?
                .unwrap_or_else(|| Value::String(text.to_string())));
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(text) {
            let Some(matched) = caps.get(0) else {
                continue;
            };
            out.push_str(&text[last..matched.start()]);
            let placeholder = Placeholder::parse(&caps[1])?;
            match self.lookup(&placeholder, pass, context)? {
                Some(value) => out.push_str(&render(&value)),
                None => out.push_str(matched.as_str()),
            }
            last = matched.end();
        }
        out.push_str(&text[last..]);
        Ok(Value::String(out))
    }

    /// `Ok(None)` leaves the placeholder for a later pass
    fn lookup(
        &self,
        placeholder: &Placeholder<'_>,
        pass: Pass,
        context: &ExecutionContext,
    ) -> Result<Option<Value>, ActionError> {
        let found = match (placeholder.reference, pass) {
            (Reference::Variable(name), _) => self.variables.resolve(name),
            (_, Pass::Variables) => return Ok(None),
            (Reference::StepStatistic { step, statistic }, Pass::Context) => {
                context.statistic(step, statistic).cloned()
            }
            (Reference::DatasetRowCount(key), Pass::Context) => {
                context.dataset(key).map(|dataset| Value::from(dataset.len()))
            }
        };

        if let Some(value) = found {
            return Ok(Some(value));
        }
        if let Some(fallback) = placeholder.fallback {
            return Ok(Some(fallback_value(fallback)));
        }

        let message = match placeholder.reference {
            Reference::Variable(_) => "undefined variable".to_string(),
            Reference::StepStatistic { step, statistic } => {
                format!("step '{step}' recorded no statistic '{statistic}'")
            }
            Reference::DatasetRowCount(key) => format!("dataset '{key}' not found in context"),
        };
        Err(ActionError::configuration(placeholder.name(), message))
    }
}

fn whole_match(caps: &Captures<'_>, text: &str) -> bool {
    caps.get(0)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}

/// Scalars in a fallback keep their JSON type: `${n:-8}` yields `8`
fn fallback_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomap_core::{ActionResult, Dataset};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn resolver(vars: MapVariables) -> ParameterResolver {
        ParameterResolver::new(Arc::new(vars))
    }

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.apply(
            "load",
            ActionResult::success()
                .with_output("ids", Dataset::from_column("identifier", ["a", "b"]))
                .with_statistic("duplicates_removed", 1),
        );
        ctx
    }

    #[test]
    fn whole_string_placeholder_keeps_type() {
        let r = resolver(MapVariables::new().with("batch", 50));
        let out = r.resolve(&json!({"size": "${batch}"}), &context()).unwrap();
        assert_eq!(out, json!({"size": 50}));
    }

    #[test]
    fn embedded_placeholders_interpolate() {
        let r = resolver(MapVariables::new().with("data_dir", "/data"));
        let out = r
            .resolve(&json!({"file": "${data_dir}/ids_${steps.load.row_count}.txt"}), &context())
            .unwrap();
        assert_eq!(out, json!({"file": "/data/ids_2.txt"}));
    }

    #[test]
    fn context_references() {
        let r = ParameterResolver::default();
        let out = r
            .resolve(
                &json!(["${steps.load.duplicates_removed}", "${datasets.ids.row_count}"]),
                &context(),
            )
            .unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn statistic_names_may_contain_dots() {
        let r = ParameterResolver::default();
        let out = r.resolve(&json!("${steps.load.ids.row_count}"), &context()).unwrap();
        assert_eq!(out, json!(2));
    }

    #[test]
    fn variable_value_may_hold_context_reference() {
        let r = resolver(MapVariables::new().with("expected", "${datasets.ids.row_count}"));
        let out = r.resolve(&json!({"n": "${expected}"}), &context()).unwrap();
        assert_eq!(out, json!({"n": 2}));
    }

    #[test]
    fn fallbacks() {
        let r = ParameterResolver::default();
        let out = r
            .resolve(
                &json!({"n": "${concurrency:-8}", "dir": "${dir:-/tmp}", "s": "${steps.none.x:-0}"}),
                &context(),
            )
            .unwrap();
        assert_eq!(out, json!({"n": 8, "dir": "/tmp", "s": 0}));
    }

    #[test]
    fn undefined_variable_is_configuration_error() {
        let err = ParameterResolver::default()
            .resolve(&json!({"file": "${data_dir}/x"}), &context())
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::configuration("data_dir", "undefined variable")
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_context_reference_is_configuration_error() {
        let r = ParameterResolver::default();
        let err = r.resolve(&json!("${steps.later.row_count}"), &context()).unwrap_err();
        assert!(matches!(err, ActionError::Configuration { ref variable, .. } if variable == "steps.later.row_count"));

        let err = r.resolve(&json!("${datasets.ids.size}"), &context()).unwrap_err();
        assert!(matches!(err, ActionError::Configuration { .. }));
    }

    #[test]
    fn plain_values_untouched() {
        let params = json!({"a": 1, "b": [true, null, "text"], "c": {"d": "$notaplaceholder"}});
        let out = ParameterResolver::default().resolve(&params, &context()).unwrap();
        assert_eq!(out, params);
    }
}
