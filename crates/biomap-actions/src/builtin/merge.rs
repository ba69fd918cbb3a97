//! `merge_datasets`: join two datasets on a key column
//!
//! Output rows are fresh copies; neither input dataset is shared with the
//! result. On a column-name clash the left value keeps the name and the right
//! value is stored under `<name>_right`.

use super::value_key;
use crate::action::{ActionContext, TypedAction};
use crate::schema::{ParamField, ParamKind, ParamSchema};
use async_trait::async_trait;
use biomap_core::{ActionError, ActionResult, Dataset, Record};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;

/// Join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Rows whose key is on both sides
    Inner,
    /// Every left row, joined where possible
    Left,
    /// Every row from either side
    Outer,
}

impl FromStr for JoinKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "outer" => Ok(Self::Outer),
            other => Err(ActionError::validation(
                "how",
                format!("unknown join '{other}', expected inner, left or outer"),
            )),
        }
    }
}

/// Parameters of `merge_datasets`
#[derive(Debug, Deserialize)]
pub struct MergeDatasetsParams {
    /// Left dataset
    pub left_key: String,
    /// Right dataset
    pub right_key: String,
    /// Key the joined rows are written under
    pub output_key: String,
    /// Join column present in both datasets
    #[serde(default)]
    pub on: Option<String>,
    /// Join column of the left dataset when the names differ
    #[serde(default)]
    pub left_on: Option<String>,
    /// Join column of the right dataset when the names differ
    #[serde(default)]
    pub right_on: Option<String>,
    /// `inner`, `left` or `outer`
    pub how: String,
}

/// Joins two datasets on a key column
#[derive(Debug, Default)]
pub struct MergeDatasets;

fn merged_row(left: &Record, right: &Record, right_on: &str, same_key: bool) -> Record {
    let mut row = left.clone();
    for (column, value) in right {
        if same_key && column == right_on {
            continue;
        }
        if row.contains_key(column) {
            row.insert(format!("{column}_right"), value.clone());
        } else {
            row.insert(column.clone(), value.clone());
        }
    }
    row
}

#[async_trait]
impl TypedAction for MergeDatasets {
    type Params = MergeDatasetsParams;

    const ACTION_TYPE: &'static str = "merge_datasets";

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("left_key", ParamKind::String))
            .field(ParamField::required("right_key", ParamKind::String))
            .field(ParamField::required("output_key", ParamKind::String))
            .field(ParamField::optional("on", ParamKind::String))
            .field(ParamField::optional("left_on", ParamKind::String))
            .field(ParamField::optional("right_on", ParamKind::String))
            .field(ParamField::optional("how", ParamKind::String).with_default("inner"))
    }

    async fn run(
        &self,
        params: MergeDatasetsParams,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        let how: JoinKind = params.how.parse()?;
        let left_on = params
            .left_on
            .or_else(|| params.on.clone())
            .ok_or_else(|| ActionError::validation("on", "a join column is required"))?;
        let right_on = params
            .right_on
            .or(params.on)
            .ok_or_else(|| ActionError::validation("on", "a join column is required"))?;
        let same_key = left_on == right_on;

        let left = ctx.dataset("left_key", &params.left_key)?;
        let right = ctx.dataset("right_key", &params.right_key)?;

        let mut right_index: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (idx, row) in right.iter().enumerate() {
            if let Some(key) = row.get(&right_on).and_then(value_key) {
                right_index.entry(key).or_default().push(idx);
            }
        }

        let mut output = Dataset::new();
        let mut matched_right = HashSet::new();
        let mut matched_rows = 0usize;
        let mut left_unmatched = 0usize;

        for left_row in left.iter() {
            let matches = left_row
                .get(&left_on)
                .and_then(value_key)
                .and_then(|key| right_index.get(&key));
            match matches {
                Some(indices) => {
                    for &idx in indices {
                        matched_right.insert(idx);
                        matched_rows += 1;
                        output.push(merged_row(left_row, &right.rows()[idx], &right_on, same_key));
                    }
                }
                None => {
                    left_unmatched += 1;
                    if matches!(how, JoinKind::Left | JoinKind::Outer) {
                        output.push(left_row.clone());
                    }
                }
            }
        }

        let right_unmatched = right.len() - matched_right.len();
        if how == JoinKind::Outer {
            for (idx, row) in right.iter().enumerate() {
                if !matched_right.contains(&idx) {
                    output.push(row.clone());
                }
            }
        }

        let rows = output.len();
        Ok(ActionResult::success()
            .with_output(params.output_key, output)
            .with_statistic("matched_rows", matched_rows)
            .with_statistic("left_unmatched", left_unmatched)
            .with_statistic("right_unmatched", right_unmatched)
            .with_statistic("rows", rows))
    }
}
