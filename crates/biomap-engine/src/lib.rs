//! biomap Engine
//!
//! Runs strategies:
//! - [`StrategyExecutor`]: sequential step orchestration with retry, timeout
//!   and the critical/non-critical failure policy
//! - [`ParameterResolver`]: `${...}` substitution from variables and earlier steps
//! - [`StrategyState`] / [`StepState`]: validated state machines
//! - [`EngineConfig`]: TOML-loadable settings, [`init_tracing`] for logging
//! - [`RunReport`] / [`Reporter`]: what a finished run hands back
//!
//! # Example
//!
//! ```rust,ignore
//! use biomap_actions::ActionRegistry;
//! use biomap_engine::{EngineConfig, StrategyExecutor};
//!
//! let config = EngineConfig::from_file("biomap.toml")?;
//! biomap_engine::init_tracing(&config.logging);
//!
//! let executor = StrategyExecutor::assemble(
//!     config,
//!     Arc::new(ActionRegistry::with_defaults()),
//!     &resource_provider,
//!     clients,
//! )
//! .await?;
//! let report = executor.run(&strategy, ExecutionContext::new()).await?;
//! assert!(report.succeeded());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod executor;
pub mod params;
pub mod report;
pub mod retry;
pub mod state;
pub mod telemetry;

pub use config::{CacheConfig, EngineConfig, LoggingConfig, RetryConfig};
pub use error::{ConfigError, EngineError, StateError};
pub use executor::StrategyExecutor;
pub use params::ParameterResolver;
pub use report::{Reporter, RunReport, StepReport, TracingReporter};
pub use retry::Backoff;
pub use state::{validate_transition, StateHistory, StepState, StrategyState, Transitions};
pub use telemetry::init_tracing;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
