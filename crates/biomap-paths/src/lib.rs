//! biomap Paths
//!
//! Path finding over the mapping-resource graph:
//! - [`ResourceGraph`]: ontology types as nodes, [`MappingResource`](biomap_core::MappingResource)s as edges
//! - [`PathFinder`]: bounded, cycle-free search with a pluggable [`PathComparator`]
//! - [`ChainResolver`]: resolves one identifier along a whole [`MappingPath`](biomap_core::MappingPath)
//!
//! # Example
//!
//! ```rust,ignore
//! use biomap_paths::{PathFinder, ResourceGraph};
//!
//! let graph = Arc::new(ResourceGraph::from_resources(resources)?);
//! let finder = PathFinder::new(graph).with_max_hops(3);
//! let path = finder.find_path(&"uniprot_ac".into(), &"ncbi_gene_id".into(), &BTreeSet::new())?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod chain;
pub mod comparator;
pub mod error;
pub mod finder;
pub mod graph;

pub use chain::{ChainResolver, DEFAULT_HOP_CONCURRENCY};
pub use comparator::{CostThenPriority, FewestHops, PathComparator};
pub use error::PathError;
pub use finder::{PathFinder, DEFAULT_MAX_HOPS};
pub use graph::{ResourceGraph, ResourceGraphProvider, StaticResourceProvider};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
