//! `filter_dataset`: keep rows matching a column condition

use crate::action::{ActionContext, TypedAction};
use crate::schema::{ParamField, ParamKind, ParamSchema};
use async_trait::async_trait;
use biomap_core::{ActionError, ActionResult, Dataset, Record};
use serde::Deserialize;
use serde_json::Value;

/// Parameters of `filter_dataset`
#[derive(Debug, Deserialize)]
pub struct FilterDatasetParams {
    /// Dataset to filter
    pub input_key: String,
    /// Key the kept rows are written under
    pub output_key: String,
    /// Column the tests apply to
    pub column: String,
    /// Keep rows whose column equals this value
    #[serde(default)]
    pub equals: Option<Value>,
    /// Keep rows whose column is present, non-null and non-empty
    pub non_empty: bool,
}

/// Keeps the rows of a dataset that pass a column test
#[derive(Debug, Default)]
pub struct FilterDataset;

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn keep(row: &Record, params: &FilterDatasetParams) -> bool {
    let cell = row.get(&params.column);
    let equals_ok = params
        .equals
        .as_ref()
        .map_or(true, |expected| cell == Some(expected));
    let non_empty_ok = !params.non_empty || cell.is_some_and(|v| !is_empty_value(v));
    equals_ok && non_empty_ok
}

#[async_trait]
impl TypedAction for FilterDataset {
    type Params = FilterDatasetParams;

    const ACTION_TYPE: &'static str = "filter_dataset";

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("input_key", ParamKind::String))
            .field(ParamField::required("output_key", ParamKind::String))
            .field(ParamField::required("column", ParamKind::String))
            .field(ParamField::optional("equals", ParamKind::Any))
            .field(ParamField::optional("non_empty", ParamKind::Bool).with_default(false))
    }

    async fn run(
        &self,
        params: FilterDatasetParams,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        if params.equals.is_none() && !params.non_empty {
            return Err(ActionError::validation(
                "equals",
                "set 'equals' or 'non_empty' to choose rows",
            ));
        }
        let input = ctx.dataset("input_key", &params.input_key)?;

        let kept: Dataset = input.iter().filter(|row| keep(row, &params)).cloned().collect();
        let dropped = input.len() - kept.len();
        let kept_rows = kept.len();

        Ok(ActionResult::success()
            .with_output(params.output_key, kept)
            .with_statistic("kept", kept_rows)
            .with_statistic("dropped", dropped))
    }
}
