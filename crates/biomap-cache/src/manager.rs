//! Cache manager
//!
//! Resolution order for one (identifier, path) key:
//! 1. unexpired success entry: return a copy of its targets
//! 2. unexpired negative entry: [`CacheError::NoMapping`] for an empty
//!    resolution, [`CacheError::RecentFailure`] for a failed upstream call;
//!    no upstream call either way. Callers retrying a failed step use
//!    [`CacheManager::resolve_refreshing_failures`], which treats failed
//!    entries as misses.
//! 3. otherwise claim the key's in-flight slot. The first claimant (leader)
//!    calls upstream, stores the outcome and broadcasts it; later claimants
//!    (followers) wait on that broadcast for at most `lock_timeout`, then fall
//!    back to a direct uncached resolution.
//!
//! The in-flight map is the only state guarded by a lock, and the lock is
//! never held across an await.

use crate::entry::{CacheEntry, CacheKey};
use crate::error::CacheError;
use crate::store::{CacheStore, MemoryCacheStore, StoreError};
use biomap_core::{MappedTarget, MappingPath, PathId, PathResolver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// TTLs and waiting bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Lifetime of entries with targets
    pub success_ttl: Duration,
    /// Lifetime of empty and failed entries
    pub negative_ttl: Duration,
    /// Longest a follower waits on an in-flight resolution
    pub lock_timeout: Duration,
    /// Resolve directly after a lock timeout instead of failing
    pub fallback_on_lock_timeout: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            success_ttl: Duration::from_secs(24 * 60 * 60),
            negative_ttl: Duration::from_secs(5 * 60),
            lock_timeout: Duration::from_secs(30),
            fallback_on_lock_timeout: true,
        }
    }
}

impl CachePolicy {
    /// Set the lifetime of entries with targets
    #[inline]
    #[must_use]
    pub fn with_success_ttl(mut self, ttl: Duration) -> Self {
        self.success_ttl = ttl;
        self
    }

    /// Set the lifetime of empty and failed entries
    #[inline]
    #[must_use]
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    /// Set how long a follower waits on an in-flight resolution
    #[inline]
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Choose between a direct resolution and [`CacheError::LockTimeout`]
    /// once a follower gives up waiting
    #[inline]
    #[must_use]
    pub fn with_fallback_on_lock_timeout(mut self, fallback: bool) -> Self {
        self.fallback_on_lock_timeout = fallback;
        self
    }
}

/// Where a resolution's targets came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Stored entry
    Cache,
    /// This caller performed the upstream call
    Upstream,
    /// Shared the outcome of another caller's in-flight call
    Coalesced,
    /// Direct call after waiting on an in-flight call timed out
    Fallback,
    /// Caching disabled for the step
    Uncached,
}

/// Targets for one identifier
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Never empty; empty resolutions surface as [`CacheError::NoMapping`]
    pub targets: Vec<MappedTarget>,
    /// Where the targets came from
    pub source: ResolutionSource,
}

impl Resolution {
    fn new(targets: Vec<MappedTarget>, source: ResolutionSource) -> Self {
        Self { targets, source }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered by a success entry
    pub hits: u64,
    /// Lookups answered by an empty or failed entry
    pub negative_hits: u64,
    /// Leaders that found no usable entry
    pub misses: u64,
    /// Followers that received a leader's outcome
    pub coalesced: u64,
    /// Followers that stopped waiting on a leader
    pub lock_timeouts: u64,
    /// Calls made to the path resolver
    pub upstream_calls: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    negative_hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    lock_timeouts: AtomicU64,
    upstream_calls: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
        }
    }
}

type Outcome = Result<Vec<MappedTarget>, CacheError>;
type InFlight = Mutex<HashMap<CacheKey, Slot>>;

struct Slot {
    generation: u64,
    outcome: watch::Receiver<Option<Outcome>>,
}

/// Removes the leader's slot when the leader finishes or is dropped
struct SlotGuard<'a> {
    in_flight: &'a InFlight,
    key: CacheKey,
    generation: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            in_flight.remove(&self.key);
        }
    }
}

enum FollowerWait {
    Ready(Outcome),
    /// Leader dropped without publishing (cancelled)
    Abandoned,
    TimedOut,
}

/// How a lookup treats an unexpired failed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failures {
    Honour,
    Refresh,
}

enum Role<'a> {
    Leader(watch::Sender<Option<Outcome>>, SlotGuard<'a>),
    Follower(watch::Receiver<Option<Outcome>>),
}

/// Memoizes identifier resolutions with single-flight semantics
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
    in_flight: InFlight,
    next_generation: AtomicU64,
    counters: Counters,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.store)
            .field("policy", &self.policy)
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCacheStore::default()), CachePolicy::default())
    }
}

impl CacheManager {
    /// Manager over `store` with the given TTLs and waiting bounds
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            policy,
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// TTLs and waiting bounds in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Resolve `identifier` along `path`, consulting and filling the cache
    ///
    /// # Errors
    /// [`CacheError::NoMapping`] when the resolution is known to be empty,
    /// [`CacheError::RecentFailure`] when it failed upstream within the
    /// negative TTL, [`CacheError::Upstream`] when this call (or the
    /// in-flight call it joined) failed upstream, [`CacheError::LockTimeout`]
    /// when waiting timed out and fallback is disabled.
    pub async fn resolve(
        &self,
        identifier: &str,
        path: &MappingPath,
        resolver: &dyn PathResolver,
    ) -> Result<Resolution, CacheError> {
        self.resolve_with(identifier, path, resolver, Failures::Honour)
            .await
    }

    /// Like [`resolve`](Self::resolve), but a stored upstream failure counts
    /// as a miss and is replaced by a fresh resolution. Empty resolutions
    /// are still honoured.
    ///
    /// # Errors
    /// As [`resolve`](Self::resolve), minus [`CacheError::RecentFailure`].
    pub async fn resolve_refreshing_failures(
        &self,
        identifier: &str,
        path: &MappingPath,
        resolver: &dyn PathResolver,
    ) -> Result<Resolution, CacheError> {
        self.resolve_with(identifier, path, resolver, Failures::Refresh)
            .await
    }

    async fn resolve_with(
        &self,
        identifier: &str,
        path: &MappingPath,
        resolver: &dyn PathResolver,
        failures: Failures,
    ) -> Result<Resolution, CacheError> {
        let key = CacheKey::new(identifier, path.id().clone());

        loop {
            if let Some(found) = self.lookup(&key, failures).await {
                return found;
            }

            match self.claim(&key) {
                Role::Leader(outcome_tx, guard) => {
                    // A previous leader may have finished between lookup and claim
                    let (outcome, source) = match self.lookup(&key, failures).await {
                        Some(found) => (found.map(|r| r.targets), ResolutionSource::Cache),
                        None => {
                            Counters::bump(&self.counters.misses);
                            let fetched = self.fetch_and_store(&key, path, resolver).await;
                            (fetched, ResolutionSource::Upstream)
                        }
                    };
                    outcome_tx.send_replace(Some(outcome.clone()));
                    drop(guard);
                    return outcome.map(|targets| Resolution::new(targets, source));
                }
                Role::Follower(outcome_rx) => {
                    match self.wait_for_leader(outcome_rx).await {
                        FollowerWait::Ready(outcome) => {
                            Counters::bump(&self.counters.coalesced);
                            return outcome.map(|targets| {
                                Resolution::new(targets, ResolutionSource::Coalesced)
                            });
                        }
                        FollowerWait::Abandoned => {
                            tracing::debug!(key = %key, "in-flight resolution abandoned, retrying");
                        }
                        FollowerWait::TimedOut => {
                            return self.after_lock_timeout(&key, path, resolver).await;
                        }
                    }
                }
            }
        }
    }

    /// Resolve directly, bypassing the cache entirely
    ///
    /// # Errors
    /// [`CacheError::Upstream`] when the client chain fails.
    pub async fn resolve_uncached(
        &self,
        identifier: &str,
        path: &MappingPath,
        resolver: &dyn PathResolver,
    ) -> Result<Resolution, CacheError> {
        self.direct(identifier, path, resolver)
            .await
            .map(|targets| Resolution::new(targets, ResolutionSource::Uncached))
    }

    /// Stored entry for a key, expired or not
    pub async fn entry(&self, identifier: &str, path_id: &PathId) -> Option<CacheEntry> {
        let key = CacheKey::new(identifier, path_id.clone());
        self.store.get(&key).await.ok().flatten()
    }

    /// Drop the entry for one key
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn invalidate(&self, identifier: &str, path_id: &PathId) -> Result<(), StoreError> {
        self.store
            .remove(&CacheKey::new(identifier, path_id.clone()))
            .await
    }

    /// Drop every expired entry
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let purged = self.store.purge_expired().await?;
        tracing::debug!(purged, "expired cache entries purged");
        Ok(purged)
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Keys currently being resolved upstream
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    async fn lookup(
        &self,
        key: &CacheKey,
        failures: Failures,
    ) -> Option<Result<Resolution, CacheError>> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) if !entry.is_expired() => entry,
            Ok(_) => return None,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cache store read failed, treating as miss");
                return None;
            }
        };

        if entry.is_failure() {
            if failures == Failures::Refresh {
                tracing::debug!(key = %key, "refreshing recorded upstream failure");
                return None;
            }
            Counters::bump(&self.counters.negative_hits);
            tracing::trace!(key = %key, "cached failure hit");
            return Some(Err(CacheError::RecentFailure {
                identifier: key.identifier.clone(),
                reason: entry.reason.unwrap_or_default(),
            }));
        }

        if entry.is_negative() {
            Counters::bump(&self.counters.negative_hits);
            tracing::trace!(key = %key, "negative cache hit");
            return Some(Err(CacheError::NoMapping {
                identifier: key.identifier.clone(),
                path_id: key.path_id.clone(),
            }));
        }

        Counters::bump(&self.counters.hits);
        tracing::trace!(key = %key, targets = entry.targets.len(), "cache hit");
        Some(Ok(Resolution::new(entry.targets, ResolutionSource::Cache)))
    }

    fn claim(&self, key: &CacheKey) -> Role<'_> {
        let mut in_flight = self.in_flight.lock();
        if let Some(slot) = in_flight.get(key) {
            return Role::Follower(slot.outcome.clone());
        }

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        in_flight.insert(
            key.clone(),
            Slot {
                generation,
                outcome: outcome_rx,
            },
        );
        Role::Leader(
            outcome_tx,
            SlotGuard {
                in_flight: &self.in_flight,
                key: key.clone(),
                generation,
            },
        )
    }

    async fn fetch_and_store(
        &self,
        key: &CacheKey,
        path: &MappingPath,
        resolver: &dyn PathResolver,
    ) -> Outcome {
        let (entry, outcome) = match self.direct(&key.identifier, path, resolver).await {
            Ok(targets) if targets.is_empty() => (
                CacheEntry::negative("empty resolution", self.policy.negative_ttl),
                Err(CacheError::NoMapping {
                    identifier: key.identifier.clone(),
                    path_id: key.path_id.clone(),
                }),
            ),
            Ok(targets) => (
                CacheEntry::success(targets.clone(), self.policy.success_ttl),
                Ok(targets),
            ),
            Err(err) => {
                let reason = match &err {
                    CacheError::Upstream { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                (CacheEntry::failed(reason, self.policy.negative_ttl), Err(err))
            }
        };

        if let Err(err) = self.store.put(key.clone(), entry).await {
            tracing::warn!(key = %key, error = %err, "cache store write failed");
        }
        outcome
    }

    async fn wait_for_leader(
        &self,
        mut outcome_rx: watch::Receiver<Option<Outcome>>,
    ) -> FollowerWait {
        let waited =
            tokio::time::timeout(self.policy.lock_timeout, outcome_rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(current)) => match &*current {
                Some(outcome) => FollowerWait::Ready(outcome.clone()),
                None => FollowerWait::Abandoned,
            },
            Ok(Err(_)) => FollowerWait::Abandoned,
            Err(_) => FollowerWait::TimedOut,
        }
    }

    async fn after_lock_timeout(
        &self,
        key: &CacheKey,
        path: &MappingPath,
        resolver: &dyn PathResolver,
    ) -> Result<Resolution, CacheError> {
        Counters::bump(&self.counters.lock_timeouts);
        let waited_ms = u64::try_from(self.policy.lock_timeout.as_millis()).unwrap_or(u64::MAX);

        if !self.policy.fallback_on_lock_timeout {
            return Err(CacheError::LockTimeout {
                identifier: key.identifier.clone(),
                waited_ms,
            });
        }

        tracing::warn!(key = %key, waited_ms, "in-flight resolution too slow, resolving uncached");
        self.direct(&key.identifier, path, resolver)
            .await
            .map(|targets| Resolution::new(targets, ResolutionSource::Fallback))
    }

    async fn direct(
        &self,
        identifier: &str,
        path: &MappingPath,
        resolver: &dyn PathResolver,
    ) -> Outcome {
        Counters::bump(&self.counters.upstream_calls);
        resolver
            .resolve_path(identifier, path)
            .await
            .map_err(|err| CacheError::Upstream {
                identifier: identifier.to_string(),
                message: err.message,
            })
    }
}
