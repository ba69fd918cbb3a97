//! Path finder
//!
//! Enumerates simple paths (no repeated ontology type) up to `max_hops` and
//! picks the best one with the configured [`PathComparator`]. Results,
//! including misses, are memoized per (source, target, exclusions) for the
//! lifetime of the finder, which is one strategy run.

use crate::comparator::{CostThenPriority, PathComparator};
use crate::error::PathError;
use crate::graph::ResourceGraph;
use biomap_core::{MappingPath, MappingResource, OntologyType, ResourceId};
use dashmap::DashMap;
use petgraph::graph::NodeIndex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default multi-hop limit
pub const DEFAULT_MAX_HOPS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PathKey {
    source: OntologyType,
    target: OntologyType,
    excluded: BTreeSet<ResourceId>,
}

/// Finds the preferred mapping path between two ontology types
#[derive(Debug)]
pub struct PathFinder {
    graph: Arc<ResourceGraph>,
    comparator: Arc<dyn PathComparator>,
    max_hops: usize,
    resolved: DashMap<PathKey, Option<Arc<MappingPath>>>,
}

impl PathFinder {
    /// Create finder with [`CostThenPriority`] and the default hop limit
    #[must_use]
    pub fn new(graph: Arc<ResourceGraph>) -> Self {
        Self {
            graph,
            comparator: Arc::new(CostThenPriority),
            max_hops: DEFAULT_MAX_HOPS,
            resolved: DashMap::new(),
        }
    }

    /// Replace the path ordering policy
    #[inline]
    #[must_use]
    pub fn with_comparator(mut self, comparator: Arc<dyn PathComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Set hop limit (at least one)
    #[inline]
    #[must_use]
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    /// Fresh finder over the same graph and policy, with an empty path cache
    #[must_use]
    pub fn for_new_run(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            comparator: Arc::clone(&self.comparator),
            max_hops: self.max_hops,
            resolved: DashMap::new(),
        }
    }

    /// Graph searched
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &Arc<ResourceGraph> {
        &self.graph
    }

    /// Longest chain considered
    #[inline]
    #[must_use]
    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Number of memoized (source, target, exclusions) lookups
    #[inline]
    #[must_use]
    pub fn cached_paths(&self) -> usize {
        self.resolved.len()
    }

    /// Find the preferred path from `source` to `target`
    ///
    /// # Errors
    /// [`PathError::IdenticalTypes`] when both types are equal,
    /// [`PathError::NoPathFound`] when no chain within the hop limit exists.
    pub fn find_path(
        &self,
        source: &OntologyType,
        target: &OntologyType,
        excluded: &BTreeSet<ResourceId>,
    ) -> Result<Arc<MappingPath>, PathError> {
        if source == target {
            return Err(PathError::IdenticalTypes(source.clone()));
        }

        let key = PathKey {
            source: source.clone(),
            target: target.clone(),
            excluded: excluded.clone(),
        };

        let cached = self.resolved.get(&key).map(|hit| hit.value().clone());
        let found = match cached {
            Some(hit) => hit,
            None => {
                let searched = self.search(source, target, excluded).map(Arc::new);
                match &searched {
                    Some(path) => tracing::debug!(
                        source = %source,
                        target = %target,
                        path_id = %path.id(),
                        comparator = self.comparator.name(),
                        route = %path.describe(),
                        "mapping path selected"
                    ),
                    None => tracing::debug!(source = %source, target = %target, "no mapping path"),
                }
                self.resolved.entry(key).or_insert(searched).value().clone()
            }
        };

        found.ok_or_else(|| PathError::NoPathFound {
            source_type: source.clone(),
            target_type: target.clone(),
        })
    }

    fn search(
        &self,
        source: &OntologyType,
        target: &OntologyType,
        excluded: &BTreeSet<ResourceId>,
    ) -> Option<MappingPath> {
        let start = self.graph.index_of(source)?;
        let goal = self.graph.index_of(target)?;

        let mut best: Option<MappingPath> = None;
        let mut chain: Vec<&MappingResource> = Vec::with_capacity(self.max_hops);
        let mut on_path = vec![start];
        self.walk(start, goal, excluded, &mut chain, &mut on_path, &mut best);
        best
    }

    fn walk<'g>(
        &'g self,
        node: NodeIndex,
        goal: NodeIndex,
        excluded: &BTreeSet<ResourceId>,
        chain: &mut Vec<&'g MappingResource>,
        on_path: &mut Vec<NodeIndex>,
        best: &mut Option<MappingPath>,
    ) {
        if chain.len() >= self.max_hops {
            return;
        }

        for (next, resource) in self.graph.outgoing(node) {
            if excluded.contains(&resource.id) || on_path.contains(&next) {
                continue;
            }
            chain.push(resource);

            if next == goal {
                let candidate = chain.iter().map(|r| (*r).clone()).collect();
                if let Some(candidate) = MappingPath::from_chain(candidate) {
                    let better = best
                        .as_ref()
                        .map_or(true, |current| self.comparator.compare(&candidate, current).is_lt());
                    if better {
                        *best = Some(candidate);
                    }
                }
            } else {
                on_path.push(next);
                self.walk(next, goal, excluded, chain, on_path, best);
                on_path.pop();
            }

            chain.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::FewestHops;

    fn graph(resources: Vec<MappingResource>) -> Arc<ResourceGraph> {
        Arc::new(ResourceGraph::from_resources(resources).unwrap())
    }

    fn ids(path: &MappingPath) -> Vec<&str> {
        path.resources().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn finds_direct_path() {
        let finder = PathFinder::new(graph(vec![MappingResource::new("r1", "a", "b")]));
        let path = finder
            .find_path(&"a".into(), &"b".into(), &BTreeSet::new())
            .unwrap();
        assert_eq!(ids(&path), vec!["r1"]);
    }

    #[test]
    fn composes_multi_hop_path() {
        let finder = PathFinder::new(graph(vec![
            MappingResource::new("r1", "a", "b"),
            MappingResource::new("r2", "b", "c"),
            MappingResource::new("r3", "c", "d"),
        ]));
        let path = finder
            .find_path(&"a".into(), &"d".into(), &BTreeSet::new())
            .unwrap();
        assert_eq!(ids(&path), vec!["r1", "r2", "r3"]);
        assert_eq!(path.total_cost(), 3);
    }

    #[test]
    fn cheaper_multi_hop_beats_expensive_direct() {
        let resources = vec![
            MappingResource::new("direct", "a", "c").with_cost(5),
            MappingResource::new("ab", "a", "b"),
            MappingResource::new("bc", "b", "c"),
        ];
        let finder = PathFinder::new(graph(resources.clone()));
        let path = finder
            .find_path(&"a".into(), &"c".into(), &BTreeSet::new())
            .unwrap();
        assert_eq!(ids(&path), vec!["ab", "bc"]);

        let hops = PathFinder::new(graph(resources)).with_comparator(Arc::new(FewestHops));
        let path = hops
            .find_path(&"a".into(), &"c".into(), &BTreeSet::new())
            .unwrap();
        assert_eq!(ids(&path), vec!["direct"]);
    }

    #[test]
    fn exclusions_are_honoured() {
        let finder = PathFinder::new(graph(vec![
            MappingResource::new("r1", "a", "b"),
            MappingResource::new("r2", "a", "b").with_cost(3),
        ]));
        let excluded: BTreeSet<ResourceId> = ["r1".into()].into_iter().collect();
        let path = finder.find_path(&"a".into(), &"b".into(), &excluded).unwrap();
        assert_eq!(ids(&path), vec!["r2"]);
    }

    #[test]
    fn hop_limit_bounds_search() {
        let finder = PathFinder::new(graph(vec![
            MappingResource::new("r1", "a", "b"),
            MappingResource::new("r2", "b", "c"),
            MappingResource::new("r3", "c", "d"),
        ]))
        .with_max_hops(2);
        let err = finder
            .find_path(&"a".into(), &"d".into(), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, PathError::NoPathFound { .. }));
    }

    #[test]
    fn cycles_are_not_traversed() {
        let finder = PathFinder::new(graph(vec![
            MappingResource::new("ab", "a", "b"),
            MappingResource::new("ba", "b", "a"),
            MappingResource::new("bc", "b", "c"),
        ]));
        let path = finder
            .find_path(&"a".into(), &"c".into(), &BTreeSet::new())
            .unwrap();
        assert_eq!(ids(&path), vec!["ab", "bc"]);
    }

    #[test]
    fn unknown_types_and_identical_types() {
        let finder = PathFinder::new(graph(vec![MappingResource::new("r1", "a", "b")]));
        assert!(matches!(
            finder.find_path(&"a".into(), &"z".into(), &BTreeSet::new()),
            Err(PathError::NoPathFound { .. })
        ));
        assert!(matches!(
            finder.find_path(&"a".into(), &"a".into(), &BTreeSet::new()),
            Err(PathError::IdenticalTypes(_))
        ));
    }

    #[test]
    fn resolved_paths_are_memoized() {
        let finder = PathFinder::new(graph(vec![MappingResource::new("r1", "a", "b")]));
        let first = finder
            .find_path(&"a".into(), &"b".into(), &BTreeSet::new())
            .unwrap();
        let _ = finder.find_path(&"b".into(), &"a".into(), &BTreeSet::new());
        let second = finder
            .find_path(&"a".into(), &"b".into(), &BTreeSet::new())
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(finder.cached_paths(), 2);
        assert_eq!(finder.for_new_run().cached_paths(), 0);
    }
}
