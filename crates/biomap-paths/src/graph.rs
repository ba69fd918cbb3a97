//! Resource graph
//!
//! Nodes are ontology types, edges are [`MappingResource`]s. Parallel edges
//! between the same pair of types are allowed. The graph is built once and
//! shared read-only across runs behind an `Arc`.

use crate::error::PathError;
use async_trait::async_trait;
use biomap_core::{MappingResource, OntologyType, ResourceId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Directed multigraph of mapping resources
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<OntologyType, MappingResource>,
    nodes: HashMap<OntologyType, NodeIndex>,
    resource_ids: HashSet<ResourceId>,
    next_priority: u32,
}

impl ResourceGraph {
    /// Graph with no resources
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph registering resources in iteration order
    ///
    /// # Errors
    /// Returns [`PathError::DuplicateResource`] on a repeated resource id.
    pub fn from_resources(
        resources: impl IntoIterator<Item = MappingResource>,
    ) -> Result<Self, PathError> {
        let mut graph = Self::new();
        for resource in resources {
            graph.register(resource)?;
        }
        Ok(graph)
    }

    /// Load every resource a provider supplies, keeping its priorities
    ///
    /// # Errors
    /// Propagates provider failures and duplicate ids.
    pub async fn load(provider: &dyn ResourceGraphProvider) -> Result<Self, PathError> {
        let mut graph = Self::new();
        for resource in provider.load_resources().await? {
            graph.insert(resource)?;
        }
        tracing::debug!(
            types = graph.type_count(),
            resources = graph.resource_count(),
            "resource graph loaded"
        );
        Ok(graph)
    }

    /// Register a resource; its priority becomes its registration order
    ///
    /// # Errors
    /// Returns [`PathError::DuplicateResource`] if the id is already present.
    pub fn register(&mut self, resource: MappingResource) -> Result<(), PathError> {
        let priority = self.next_priority;
        self.insert(resource.with_priority(priority))
    }

    /// Insert a resource with the priority it already carries
    ///
    /// # Errors
    /// Returns [`PathError::DuplicateResource`] if the id is already present.
    pub fn insert(&mut self, resource: MappingResource) -> Result<(), PathError> {
        if !self.resource_ids.insert(resource.id.clone()) {
            return Err(PathError::DuplicateResource(resource.id));
        }
        self.next_priority = self.next_priority.max(resource.priority.saturating_add(1));

        let from = self.node(&resource.source);
        let to = self.node(&resource.target);
        self.graph.add_edge(from, to, resource);
        Ok(())
    }

    fn node(&mut self, ty: &OntologyType) -> NodeIndex {
        if let Some(idx) = self.nodes.get(ty) {
            return *idx;
        }
        let idx = self.graph.add_node(ty.clone());
        self.nodes.insert(ty.clone(), idx);
        idx
    }

    pub(crate) fn index_of(&self, ty: &OntologyType) -> Option<NodeIndex> {
        self.nodes.get(ty).copied()
    }

    /// Outgoing resources of a node with the node each one leads to
    pub(crate) fn outgoing(
        &self,
        node: NodeIndex,
    ) -> impl Iterator<Item = (NodeIndex, &MappingResource)> + '_ {
        self.graph.edges(node).map(|edge| (edge.target(), edge.weight()))
    }

    /// Whether `ty` is a node
    #[inline]
    #[must_use]
    pub fn contains_type(&self, ty: &OntologyType) -> bool {
        self.nodes.contains_key(ty)
    }

    /// Whether `id` is registered
    #[inline]
    #[must_use]
    pub fn contains_resource(&self, id: &ResourceId) -> bool {
        self.resource_ids.contains(id)
    }

    /// Number of ontology types
    #[inline]
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of registered resources
    #[inline]
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All resources, sorted by priority
    #[must_use]
    pub fn resources(&self) -> Vec<&MappingResource> {
        let mut all: Vec<_> = self.graph.edge_weights().collect();
        all.sort_by_key(|r| r.priority);
        all
    }
}

/// External metadata store supplying the registered resources
#[async_trait]
pub trait ResourceGraphProvider: Send + Sync + fmt::Debug {
    /// Every registered resource, in registration order
    async fn load_resources(&self) -> Result<Vec<MappingResource>, PathError>;
}

/// Provider over a fixed resource list
#[derive(Debug, Clone, Default)]
pub struct StaticResourceProvider {
    resources: Vec<MappingResource>,
}

impl StaticResourceProvider {
    /// Resources get priorities from their position in the list
    #[must_use]
    pub fn new(resources: Vec<MappingResource>) -> Self {
        let resources = resources
            .into_iter()
            .zip(0u32..)
            .map(|(r, priority)| r.with_priority(priority))
            .collect();
        Self { resources }
    }
}

#[async_trait]
impl ResourceGraphProvider for StaticResourceProvider {
    async fn load_resources(&self) -> Result<Vec<MappingResource>, PathError> {
        Ok(self.resources.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_registration_order() {
        let graph = ResourceGraph::from_resources([
            MappingResource::new("r1", "a", "b").with_priority(40),
            MappingResource::new("r2", "a", "b"),
        ])
        .unwrap();

        let priorities: Vec<_> = graph.resources().iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![0, 1]);
        assert_eq!(graph.type_count(), 2);
        assert_eq!(graph.resource_count(), 2);
    }

    #[test]
    fn duplicate_resource_rejected() {
        let err = ResourceGraph::from_resources([
            MappingResource::new("r1", "a", "b"),
            MappingResource::new("r1", "b", "c"),
        ])
        .unwrap_err();
        assert_eq!(err, PathError::DuplicateResource("r1".into()));
    }

    #[test]
    fn insert_after_explicit_priority_continues_sequence() {
        let mut graph = ResourceGraph::new();
        graph
            .insert(MappingResource::new("r1", "a", "b").with_priority(7))
            .unwrap();
        graph.register(MappingResource::new("r2", "b", "c")).unwrap();
        let last = graph.resources().last().map(|r| r.priority);
        assert_eq!(last, Some(8));
    }

    #[tokio::test]
    async fn load_from_static_provider() {
        let provider = StaticResourceProvider::new(vec![
            MappingResource::new("r1", "a", "b"),
            MappingResource::new("r2", "b", "c"),
        ]);
        let graph = ResourceGraph::load(&provider).await.unwrap();
        assert!(graph.contains_type(&"c".into()));
        assert!(graph.contains_resource(&"r2".into()));
        assert_eq!(graph.resources()[1].priority, 1);
    }
}
