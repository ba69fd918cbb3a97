//! Mapping resources and resolved paths
//!
//! A [`MappingResource`] is one edge of the resource graph: it translates
//! identifiers from one ontology type to another at some cost. A
//! [`MappingPath`] is an ordered, connected chain of resources and is
//! immutable once built.

use crate::types::{OntologyType, PathId, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Edge of the resource graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResource {
    /// Unique resource identifier
    pub id: ResourceId,
    /// Ontology type this resource reads
    pub source: OntologyType,
    /// Ontology type this resource produces
    pub target: OntologyType,
    /// Traversal cost (summed along a path)
    #[serde(default = "default_cost")]
    pub cost: u32,
    /// Registration order; lower registers earlier
    #[serde(default)]
    pub priority: u32,
    /// Client parameters forwarded on every resolve call
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_cost() -> u32 {
    1
}

impl MappingResource {
    /// Create resource with unit cost and priority 0
    #[must_use]
    pub fn new(
        id: impl Into<ResourceId>,
        source: impl Into<OntologyType>,
        target: impl Into<OntologyType>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            cost: default_cost(),
            priority: 0,
            params: serde_json::Value::Null,
        }
    }

    /// Set traversal cost
    #[inline]
    #[must_use]
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Set registration priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set client parameters
    #[inline]
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// One identifier produced by a resolution, with its confidence in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedTarget {
    /// Produced identifier
    pub identifier: String,
    /// Composed confidence along the path
    pub confidence: f64,
}

impl MappedTarget {
    /// Create target; confidence is clamped to `[0, 1]`
    #[inline]
    #[must_use]
    pub fn new(identifier: impl Into<String>, confidence: f64) -> Self {
        Self {
            identifier: identifier.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Target with full confidence
    #[inline]
    #[must_use]
    pub fn exact(identifier: impl Into<String>) -> Self {
        Self::new(identifier, 1.0)
    }
}

/// Connected chain of resources from a source to a target ontology type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingPath {
    id: PathId,
    source: OntologyType,
    target: OntologyType,
    resources: Vec<MappingResource>,
}

impl MappingPath {
    /// Build a path from a chain of resources
    ///
    /// Returns `None` if the chain is empty or any hop's target does not
    /// match the next hop's source.
    #[must_use]
    pub fn from_chain(resources: Vec<MappingResource>) -> Option<Self> {
        let source = resources.first()?.source.clone();
        let target = resources.last()?.target.clone();
        let connected = resources
            .windows(2)
            .all(|pair| pair[0].target == pair[1].source);
        if !connected {
            return None;
        }

        Some(Self {
            id: Self::derive_id(&resources),
            source,
            target,
            resources,
        })
    }

    /// Deterministic id: blake3 digest of the resource-id chain
    fn derive_id(resources: &[MappingResource]) -> PathId {
        let mut hasher = blake3::Hasher::new();
        for resource in resources {
            hasher.update(resource.id.as_str().as_bytes());
            hasher.update(&[0x1f]);
        }
        let digest = hasher.finalize();
        PathId::new(digest.to_hex()[..32].to_string())
    }

    /// Content hash of the resource chain
    #[inline]
    #[must_use]
    pub fn id(&self) -> &PathId {
        &self.id
    }

    /// Ontology type the path starts from
    #[inline]
    #[must_use]
    pub fn source(&self) -> &OntologyType {
        &self.source
    }

    /// Ontology type the path ends at
    #[inline]
    #[must_use]
    pub fn target(&self) -> &OntologyType {
        &self.target
    }

    /// Resources in hop order
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &[MappingResource] {
        &self.resources
    }

    /// Number of hops
    #[inline]
    #[must_use]
    pub fn hops(&self) -> usize {
        self.resources.len()
    }

    /// Sum of per-edge costs
    #[must_use]
    pub fn total_cost(&self) -> u64 {
        self.resources.iter().map(|r| u64::from(r.cost)).sum()
    }

    /// Sum of per-edge registration priorities
    #[must_use]
    pub fn aggregate_priority(&self) -> u64 {
        self.resources.iter().map(|r| u64::from(r.priority)).sum()
    }

    /// Resource ids in chain order
    #[must_use]
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }

    /// Human-readable rendering, e.g. `a -[r1]-> b -[r2]-> c`
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = self.source.to_string();
        for resource in &self.resources {
            let _ = write!(out, " -[{}]-> {}", resource.id, resource.target);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<MappingResource> {
        vec![
            MappingResource::new("r1", "a", "b").with_cost(2).with_priority(0),
            MappingResource::new("r2", "b", "c").with_cost(3).with_priority(4),
        ]
    }

    #[test]
    fn path_from_connected_chain() {
        let path = MappingPath::from_chain(chain()).unwrap();
        assert_eq!(path.source().as_str(), "a");
        assert_eq!(path.target().as_str(), "c");
        assert_eq!(path.hops(), 2);
        assert_eq!(path.total_cost(), 5);
        assert_eq!(path.aggregate_priority(), 4);
        assert_eq!(path.describe(), "a -[r1]-> b -[r2]-> c");
    }

    #[test]
    fn disconnected_chain_rejected() {
        let resources = vec![
            MappingResource::new("r1", "a", "b"),
            MappingResource::new("r2", "x", "c"),
        ];
        assert!(MappingPath::from_chain(resources).is_none());
        assert!(MappingPath::from_chain(Vec::new()).is_none());
    }

    #[test]
    fn path_id_is_deterministic_and_chain_sensitive() {
        let p1 = MappingPath::from_chain(chain()).unwrap();
        let p2 = MappingPath::from_chain(chain()).unwrap();
        assert_eq!(p1.id(), p2.id());

        let other = MappingPath::from_chain(vec![MappingResource::new("r1", "a", "b")]).unwrap();
        assert_ne!(p1.id(), other.id());
    }

    #[test]
    fn mapped_target_clamps_confidence() {
        assert_eq!(MappedTarget::new("x", 1.7).confidence, 1.0);
        assert_eq!(MappedTarget::new("x", -0.2).confidence, 0.0);
    }
}
