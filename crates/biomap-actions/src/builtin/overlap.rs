//! `calculate_overlap`: set overlap between two dataset columns
//!
//! Array cells contribute each element, so a `targets` column produced by a
//! mapping step can be compared directly.

use super::cell_keys;
use crate::action::{ActionContext, TypedAction};
use crate::schema::{ParamField, ParamKind, ParamSchema};
use async_trait::async_trait;
use biomap_core::{ActionError, ActionResult, Dataset};
use indexmap::IndexSet;
use serde::Deserialize;

/// Parameters of `calculate_overlap`
#[derive(Debug, Deserialize)]
pub struct CalculateOverlapParams {
    /// Left dataset
    pub left_key: String,
    /// Right dataset
    pub right_key: String,
    /// Column compared from the left dataset
    pub left_column: String,
    /// Column compared from the right dataset
    pub right_column: String,
    /// Optional dataset of the shared values
    #[serde(default)]
    pub output_key: Option<String>,
}

/// Set statistics over two identifier columns
#[derive(Debug, Default)]
pub struct CalculateOverlap;

fn column_set(dataset: &Dataset, column: &str) -> IndexSet<String> {
    dataset.column(column).flat_map(cell_keys).collect()
}

#[async_trait]
impl TypedAction for CalculateOverlap {
    type Params = CalculateOverlapParams;

    const ACTION_TYPE: &'static str = "calculate_overlap";

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("left_key", ParamKind::String))
            .field(ParamField::required("right_key", ParamKind::String))
            .field(ParamField::optional("left_column", ParamKind::String).with_default("identifier"))
            .field(ParamField::optional("right_column", ParamKind::String).with_default("identifier"))
            .field(ParamField::optional("output_key", ParamKind::String))
    }

    async fn run(
        &self,
        params: CalculateOverlapParams,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        let left = column_set(ctx.dataset("left_key", &params.left_key)?, &params.left_column);
        let right = column_set(ctx.dataset("right_key", &params.right_key)?, &params.right_column);

        let shared: Vec<&String> = left.iter().filter(|v| right.contains(*v)).collect();
        let union = left.len() + right.len() - shared.len();
        #[allow(clippy::cast_precision_loss)]
        let jaccard = if union == 0 {
            0.0
        } else {
            shared.len() as f64 / union as f64
        };

        let mut result = ActionResult::success()
            .with_statistic("left_total", left.len())
            .with_statistic("right_total", right.len())
            .with_statistic("shared", shared.len())
            .with_statistic("left_only", left.len() - shared.len())
            .with_statistic("right_only", right.len() - shared.len())
            .with_statistic("jaccard", jaccard);

        if let Some(output_key) = params.output_key {
            let values: Vec<String> = shared.into_iter().cloned().collect();
            result = result.with_output(output_key, Dataset::from_column("identifier", values));
        }
        Ok(result)
    }
}
