//! biomap Core
//!
//! Shared data model for the strategy execution engine:
//! - [`Strategy`] / [`Step`]: immutable, declaratively defined pipelines
//! - [`ExecutionContext`]: run-scoped datasets, statistics and provenance log
//! - [`ActionResult`]: what an action hands back to the executor
//! - [`MappingResource`] / [`MappingPath`]: edges and chains between ontology types
//! - [`ActionError`] / [`ErrorKind`]: the error taxonomy shared by every component
//!
//! # Example
//!
//! ```rust,ignore
//! use biomap_core::{ExecutionContext, Strategy};
//!
//! let strategy = Strategy::from_yaml_str(document)?;
//! let context = ExecutionContext::new();
//! // hand both to biomap_engine::StrategyExecutor::run
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod context;
pub mod dataset;
pub mod error;
pub mod mapping;
pub mod provenance;
pub mod result;
pub mod strategy;
pub mod types;
pub mod variables;

pub use client::{ClientError, ClientRegistry, IdentifierClient, PathResolver};
pub use context::{ContextSnapshot, ExecutionContext, StepStatistics, ROW_COUNT};
pub use dataset::{Dataset, Record};
pub use error::{ActionError, ErrorKind};
pub use mapping::{MappedTarget, MappingPath, MappingResource};
pub use provenance::{ProvenanceEntry, ProvenanceKind};
pub use result::{ActionResult, ActionStatus};
pub use strategy::{ActionSpec, Step, StepMetadata, Strategy, StrategyError};
pub use types::{OntologyType, PathId, ResourceId, RunId};
pub use variables::{EnvVariables, LayeredVariables, MapVariables, VariableProvider};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
