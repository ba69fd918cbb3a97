//! `apply_mapping_table`: map identifiers through an inline table
//!
//! Every input identifier must appear in the table, possibly with an empty
//! target list. An identifier missing from the table entirely is a
//! validation error on `table`, raised before any output is built.

use crate::action::{ActionContext, TypedAction};
use crate::schema::{ParamField, ParamKind, ParamSchema};
use async_trait::async_trait;
use biomap_core::{ActionError, ActionResult, Dataset, ProvenanceEntry, Record};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Missing identifiers listed in an error message
const MAX_REPORTED: usize = 5;

/// Parameters of `apply_mapping_table`
#[derive(Debug, Deserialize)]
pub struct ApplyMappingTableParams {
    /// Dataset holding the identifiers
    pub input_key: String,
    /// Key the mapped rows are written under
    pub output_key: String,
    /// Identifier to list of targets; every input identifier must be a key
    pub table: Map<String, Value>,
    /// Input column read for identifiers
    pub column: String,
}

/// Maps identifiers through a literal table
#[derive(Debug, Default)]
pub struct ApplyMappingTable;

fn parse_table(raw: Map<String, Value>) -> Result<IndexMap<String, Vec<String>>, ActionError> {
    raw.into_iter()
        .map(|(source, targets)| {
            let targets = match targets {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        _ => Err(()),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .ok(),
                _ => None,
            };
            targets.map(|t| (source.clone(), t)).ok_or_else(|| {
                ActionError::validation(
                    "table",
                    format!("entry '{source}' must be a list of strings"),
                )
            })
        })
        .collect()
}

#[async_trait]
impl TypedAction for ApplyMappingTable {
    type Params = ApplyMappingTableParams;

    const ACTION_TYPE: &'static str = "apply_mapping_table";

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("input_key", ParamKind::String))
            .field(ParamField::required("output_key", ParamKind::String))
            .field(
                ParamField::required("table", ParamKind::Object)
                    .describe("source identifier to list of target identifiers"),
            )
            .field(ParamField::optional("column", ParamKind::String).with_default("identifier"))
    }

    async fn run(
        &self,
        params: ApplyMappingTableParams,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        let table = parse_table(params.table)?;
        let input = ctx.dataset("input_key", &params.input_key)?;
        let identifiers = input.column_strings(&params.column);

        let missing: Vec<&str> = identifiers
            .iter()
            .filter(|id| !table.contains_key(id.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            let shown = missing
                .iter()
                .take(MAX_REPORTED)
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ActionError::validation(
                "table",
                format!("{} identifier(s) absent from mapping table: {shown}", missing.len()),
            ));
        }

        let mut output = Dataset::new();
        let mut provenance = Vec::new();
        let mut unmapped = 0usize;
        let mut target_count = 0usize;

        for identifier in &identifiers {
            let targets = table.get(identifier.as_str()).cloned().unwrap_or_default();
            if targets.is_empty() {
                unmapped += 1;
            }
            target_count += targets.len();
            provenance.extend(targets.iter().map(|target| {
                ProvenanceEntry::mapping(ctx.step, identifier.clone(), target.clone(), None, Vec::new(), 1.0)
            }));

            let mut row = Record::new();
            row.insert(params.column.clone(), Value::String(identifier.clone()));
            row.insert("targets".to_string(), Value::from(targets));
            output.push(row);
        }

        Ok(ActionResult::success()
            .with_output(params.output_key, output)
            .with_statistic("mapped", identifiers.len() - unmapped)
            .with_statistic("unmapped", unmapped)
            .with_statistic("targets", target_count)
            .with_provenance(provenance))
    }
}
