//! biomap Actions
//!
//! The typed-action contract and the static action table:
//! - [`Action`]: object-safe handler driven by the executor (validate, then execute)
//! - [`TypedAction`]: handler with a deserialized parameter struct, adapted by [`TypedActionAdapter`]
//! - [`ParamSchema`]: declared parameters with defaults, types and unknown-field rejection
//! - [`ActionRegistry`]: action-type name to handler factory
//!
//! Built-in actions live in [`builtin`] and are registered by
//! [`ActionRegistry::with_defaults`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod action;
pub mod builtin;
pub mod registry;
pub mod schema;

pub use action::{
    Action, ActionContext, ActionServices, TypedAction, TypedActionAdapter, DEFAULT_MAX_CONCURRENCY,
};
pub use registry::{ActionFactory, ActionRegistry, RegistryError};
pub use schema::{ParamField, ParamKind, ParamSchema};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
