//! `load_identifiers`: seed a dataset from an inline list or a file

use crate::action::{ActionContext, TypedAction};
use crate::schema::{ParamField, ParamKind, ParamSchema};
use async_trait::async_trait;
use biomap_core::{ActionError, ActionResult, Dataset};
use indexmap::IndexSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Parameters of `load_identifiers`
#[derive(Debug, Deserialize)]
pub struct LoadIdentifiersParams {
    /// Key the dataset is written under
    pub output_key: String,
    /// Inline identifiers; exactly one of this and `file`
    #[serde(default)]
    pub identifiers: Option<Vec<String>>,
    /// Newline-delimited file; blank lines and `#` comments are skipped
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Name of the single output column
    pub column: String,
    /// Drop repeats, keeping first occurrences
    pub deduplicate: bool,
}

/// Reads identifiers inline or from a file into a one-column dataset
#[derive(Debug, Default)]
pub struct LoadIdentifiers;

#[async_trait]
impl TypedAction for LoadIdentifiers {
    type Params = LoadIdentifiersParams;

    const ACTION_TYPE: &'static str = "load_identifiers";

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("output_key", ParamKind::String))
            .field(ParamField::optional("identifiers", ParamKind::StringList))
            .field(ParamField::optional("file", ParamKind::String))
            .field(ParamField::optional("column", ParamKind::String).with_default("identifier"))
            .field(ParamField::optional("deduplicate", ParamKind::Bool).with_default(false))
    }

    async fn run(
        &self,
        params: LoadIdentifiersParams,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        let raw = match (params.identifiers, params.file) {
            (Some(identifiers), None) => identifiers,
            (None, Some(file)) => read_identifier_file(&file).await?,
            (Some(_), Some(_)) => {
                return Err(ActionError::validation(
                    "file",
                    "set either 'identifiers' or 'file', not both",
                ))
            }
            (None, None) => {
                return Err(ActionError::validation(
                    "identifiers",
                    "one of 'identifiers' or 'file' is required",
                ))
            }
        };

        let total = raw.len();
        let identifiers: Vec<String> = if params.deduplicate {
            raw.into_iter().collect::<IndexSet<_>>().into_iter().collect()
        } else {
            raw
        };
        let loaded = identifiers.len();

        tracing::debug!(step = ctx.step, loaded, output_key = %params.output_key, "identifiers loaded");

        Ok(ActionResult::success()
            .with_output(
                params.output_key,
                Dataset::from_column(&params.column, identifiers),
            )
            .with_statistic("loaded", loaded)
            .with_statistic("duplicates_removed", total - loaded))
    }
}

async fn read_identifier_file(path: &Path) -> Result<Vec<String>, ActionError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ActionError::execution(format!("failed to read '{}': {e}", path.display())))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
