//! `map_identifiers`: resolve a dataset column through a mapping path
//!
//! Finds the preferred path between two ontology types, resolves every
//! identifier with bounded concurrency and writes one row per input:
//! `{identifier, targets, confidence, path}`.

use crate::action::{ActionContext, TypedAction};
use crate::schema::{ParamField, ParamKind, ParamSchema};
use async_trait::async_trait;
use biomap_cache::{CacheError, ResolutionSource};
use biomap_core::{
    ActionError, ActionResult, Dataset, MappedTarget, OntologyType, ProvenanceEntry, Record,
    ResourceId,
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Parameters of `map_identifiers`
#[derive(Debug, Deserialize)]
pub struct MapIdentifiersParams {
    /// Dataset holding the source identifiers
    pub input_key: String,
    /// Key the mapped rows are written under
    pub output_key: String,
    /// Ontology type of the input identifiers
    pub source_type: OntologyType,
    /// Ontology type to map to
    pub target_type: OntologyType,
    /// Input column read for identifiers
    pub column: String,
    /// Resources the path may not use
    #[serde(default)]
    pub exclude_resources: Vec<ResourceId>,
    /// Overrides the engine's fan-out bound
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Targets below this composed confidence are dropped
    pub min_confidence: f64,
}

/// Maps a column of identifiers to another ontology type through the resource graph
#[derive(Debug, Default)]
pub struct MapIdentifiers;

#[derive(Debug, Default)]
struct Tally {
    mapped: usize,
    unmapped: usize,
    targets: usize,
    from_cache: usize,
    coalesced: usize,
    upstream: usize,
}

#[async_trait]
impl TypedAction for MapIdentifiers {
    type Params = MapIdentifiersParams;

    const ACTION_TYPE: &'static str = "map_identifiers";

    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("input_key", ParamKind::String))
            .field(ParamField::required("output_key", ParamKind::String))
            .field(ParamField::required("source_type", ParamKind::String))
            .field(ParamField::required("target_type", ParamKind::String))
            .field(ParamField::optional("column", ParamKind::String).with_default("identifier"))
            .field(
                ParamField::optional("exclude_resources", ParamKind::StringList)
                    .with_default(Value::Array(Vec::new())),
            )
            .field(ParamField::optional("concurrency", ParamKind::UnsignedInteger))
            .field(ParamField::optional("min_confidence", ParamKind::Float).with_default(0.0))
    }

    async fn run(
        &self,
        params: MapIdentifiersParams,
        ctx: ActionContext<'_>,
    ) -> Result<ActionResult, ActionError> {
        let input = ctx.dataset("input_key", &params.input_key)?;
        let excluded: BTreeSet<ResourceId> = params.exclude_resources.into_iter().collect();
        let path = ctx
            .services
            .path_finder()?
            .find_path(&params.source_type, &params.target_type, &excluded)?;

        let identifiers = input.column_strings(&params.column);
        let concurrency = params
            .concurrency
            .unwrap_or_else(|| ctx.services.max_concurrency())
            .max(1);

        tracing::debug!(
            step = ctx.step,
            identifiers = identifiers.len(),
            concurrency,
            path_id = %path.id(),
            route = %path.describe(),
            "mapping identifiers"
        );

        let ctx_ref = &ctx;
        let path_ref = path.as_ref();
        let resolve_all = stream::iter(identifiers.iter().cloned())
            .map(move |identifier: String| async move {
                let outcome = ctx_ref.resolve_identifier(&identifier, path_ref).await;
                (identifier, outcome)
            })
            .buffered(concurrency)
            .collect::<Vec<_>>();

        let resolved = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(ActionError::Cancelled),
            resolved = resolve_all => resolved,
        };

        let path_id = path.id().to_string();
        let resources = path.resource_ids();
        let mut output = Dataset::new();
        let mut provenance = Vec::new();
        let mut tally = Tally::default();

        for (identifier, outcome) in resolved {
            let targets: Vec<MappedTarget> = match outcome? {
                Ok(resolution) => {
                    match resolution.source {
                        ResolutionSource::Cache => tally.from_cache += 1,
                        ResolutionSource::Coalesced => tally.coalesced += 1,
                        ResolutionSource::Upstream
                        | ResolutionSource::Fallback
                        | ResolutionSource::Uncached => tally.upstream += 1,
                    }
                    resolution
                        .targets
                        .into_iter()
                        .filter(|t| t.confidence >= params.min_confidence)
                        .collect()
                }
                Err(CacheError::NoMapping { .. }) => Vec::new(),
                Err(err) => return Err(err.into()),
            };

            if targets.is_empty() {
                tally.unmapped += 1;
            } else {
                tally.mapped += 1;
            }
            tally.targets += targets.len();

            let best = targets
                .iter()
                .map(|t| t.confidence)
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))));

            provenance.extend(targets.iter().map(|target| {
                ProvenanceEntry::mapping(
                    ctx.step,
                    identifier.clone(),
                    target.identifier.clone(),
                    Some(path.id().clone()),
                    resources.clone(),
                    target.confidence,
                )
            }));

            let mut row = Record::new();
            row.insert(params.column.clone(), Value::String(identifier.clone()));
            row.insert(
                "targets".to_string(),
                Value::from(
                    targets
                        .into_iter()
                        .map(|t| t.identifier)
                        .collect::<Vec<_>>(),
                ),
            );
            row.insert("confidence".to_string(), best.map_or(Value::Null, Value::from));
            row.insert("path".to_string(), Value::String(path_id.clone()));
            output.push(row);
        }

        let mut result = ActionResult::success()
            .with_output(params.output_key, output)
            .with_statistic("mapped", tally.mapped)
            .with_statistic("unmapped", tally.unmapped)
            .with_statistic("targets", tally.targets)
            .with_statistic("cache_hits", tally.from_cache)
            .with_statistic("coalesced", tally.coalesced)
            .with_statistic("upstream", tally.upstream)
            .with_statistic("path_id", path_id)
            .with_statistic("path_hops", path.hops())
            .with_provenance(provenance);

        if tally.unmapped > 0 {
            result.mark_partial();
            result = result.with_warning(format!(
                "{} of {} identifiers had no mapping",
                tally.unmapped,
                identifiers.len()
            ));
        }
        Ok(result)
    }
}
