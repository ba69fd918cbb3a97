//! biomap Cache
//!
//! Identifier-level resolution cache keyed by (identifier, path id):
//! - [`CacheManager`]: single-flight resolution, negative caching, lock-timeout fallback
//! - [`CacheStore`]: persistence seam, with the moka-backed [`MemoryCacheStore`]
//! - [`CacheEntry`]: stored outcome with its own TTL
//!
//! # Example
//!
//! ```rust,ignore
//! use biomap_cache::{CacheManager, CachePolicy, MemoryCacheStore};
//!
//! let cache = CacheManager::new(Arc::new(MemoryCacheStore::new(50_000)), CachePolicy::default());
//! let resolution = cache.resolve("P12345", &path, &resolver).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod entry;
pub mod error;
pub mod manager;
pub mod store;

pub use entry::{CacheEntry, CacheKey, CacheStatus};
pub use error::CacheError;
pub use manager::{CacheManager, CachePolicy, CacheStats, Resolution, ResolutionSource};
pub use store::{CacheStore, MemoryCacheStore, StoreError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
