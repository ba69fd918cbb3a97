//! Cache persistence
//!
//! [`CacheStore`] is the key-value seam to whatever persists entries across
//! runs. [`MemoryCacheStore`] keeps them in a bounded moka cache that also
//! evicts each entry once its own TTL has passed.

use crate::entry::{CacheEntry, CacheKey};
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use moka::Expiry;
use std::fmt;
use std::time::{Duration, Instant};

/// Longest time an in-memory entry is kept regardless of its TTL
const MAX_RETENTION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Persistence store failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("cache store error: {message}")]
pub struct StoreError {
    /// What the store reported
    pub message: String,
}

impl StoreError {
    /// Error carrying `message`
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Key-value store of cache entries
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Entry for `key`, expired or not
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Store an owned copy of `entry`
    async fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<(), StoreError>;

    /// Drop the entry for `key`, if any
    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Approximate number of stored entries
    fn len(&self) -> u64;
}

struct EntryExpiry;

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl().min(MAX_RETENTION))
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl().min(MAX_RETENTION))
    }
}

/// In-memory store backed by moka
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    inner: Cache<CacheKey, CacheEntry>,
}

impl MemoryCacheStore {
    /// Create store holding at most `max_capacity` entries
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(EntryExpiry)
                .build(),
        }
    }
}

impl Default for MemoryCacheStore {
    /// Create store with default capacity (100,000 entries)
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.inner.get(key).await)
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<(), StoreError> {
        self.inner.insert(key, entry).await;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.inner.invalidate(key).await;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let expired: Vec<CacheKey> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &expired {
            self.inner.invalidate(key).await;
        }
        self.inner.run_pending_tasks().await;
        Ok(expired.len())
    }

    fn len(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomap_core::{MappedTarget, PathId};

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id, PathId::new("p1"))
    }

    #[tokio::test]
    async fn put_then_get_returns_copy() {
        let store = MemoryCacheStore::new(16);
        let entry = CacheEntry::success(vec![MappedTarget::exact("B1")], Duration::from_secs(60));
        store.put(key("A1"), entry.clone()).await.unwrap();

        assert_eq!(store.get(&key("A1")).await.unwrap(), Some(entry));
        assert_eq!(store.get(&key("A2")).await.unwrap(), None);

        store.remove(&key("A1")).await.unwrap();
        assert_eq!(store.get(&key("A1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let store = MemoryCacheStore::new(16);
        store
            .put(key("short"), CacheEntry::negative("gone", Duration::from_millis(30)))
            .await
            .unwrap();
        store
            .put(
                key("long"),
                CacheEntry::success(vec![MappedTarget::exact("x")], Duration::from_secs(60)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.get(&key("short")).await.unwrap(), None);
        assert!(store.get(&key("long")).await.unwrap().is_some());
    }
}
