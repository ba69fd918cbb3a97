//! Multi-hop identifier resolution
//!
//! Walks a [`MappingPath`] hop by hop: every identifier produced by one
//! resource is fed to the next. Confidences multiply along the chain and a
//! target reached more than once keeps its highest confidence, in first-seen
//! order. At most `max_concurrency` client calls of one hop are in flight
//! at a time.

use async_trait::async_trait;
use biomap_core::{ClientError, ClientRegistry, MappedTarget, MappingPath, PathResolver};
use futures::stream::{self, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use std::sync::Arc;

/// Default bound on concurrent client calls within one hop
pub const DEFAULT_HOP_CONCURRENCY: usize = 16;

/// [`PathResolver`] backed by one client per resource
#[derive(Debug, Clone)]
pub struct ChainResolver {
    clients: ClientRegistry,
    max_concurrency: usize,
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::new(ClientRegistry::default())
    }
}

impl ChainResolver {
    /// Resolver over `clients` with the default per-hop bound
    #[inline]
    #[must_use]
    pub fn new(clients: ClientRegistry) -> Self {
        Self {
            clients,
            max_concurrency: DEFAULT_HOP_CONCURRENCY,
        }
    }

    /// Bound concurrent client calls within one hop (at least one)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Clients keyed by resource id
    #[inline]
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Bound on concurrent client calls within one hop
    #[inline]
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

#[async_trait]
impl PathResolver for ChainResolver {
    async fn resolve_path(
        &self,
        identifier: &str,
        path: &MappingPath,
    ) -> Result<Vec<MappedTarget>, ClientError> {
        let mut frontier = vec![MappedTarget::exact(identifier)];

        for resource in path.resources() {
            let client = self.clients.get(&resource.id).ok_or_else(|| {
                ClientError::new(format!("no client registered for resource '{}'", resource.id))
            })?;

            let params = &resource.params;
            let hop_results: Vec<(f64, Vec<MappedTarget>)> =
                stream::iter(std::mem::take(&mut frontier))
                    .map(|current: MappedTarget| {
                        let client = Arc::clone(&client);
                        async move {
                            let produced = client.resolve(&current.identifier, params).await?;
                            Ok::<_, ClientError>((current.confidence, produced))
                        }
                    })
                    .buffered(self.max_concurrency)
                    .try_collect()
                    .await?;

            let mut next: IndexMap<String, f64> = IndexMap::new();
            for (inherited, produced) in hop_results {
                for target in produced {
                    let confidence = inherited * target.confidence;
                    next.entry(target.identifier)
                        .and_modify(|best| *best = best.max(confidence))
                        .or_insert(confidence);
                }
            }

            tracing::trace!(
                identifier,
                resource = %resource.id,
                produced = next.len(),
                "hop resolved"
            );

            frontier = next
                .into_iter()
                .map(|(identifier, confidence)| MappedTarget::new(identifier, confidence))
                .collect();
            if frontier.is_empty() {
                break;
            }
        }

        Ok(frontier)
    }
}
