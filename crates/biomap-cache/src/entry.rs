//! Cache keys and entries

use biomap_core::{MappedTarget, PathId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// (identifier, path id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Source identifier
    pub identifier: String,
    /// Path the identifier is resolved along
    pub path_id: PathId,
}

impl CacheKey {
    /// Key for `identifier` resolved along `path_id`
    #[inline]
    #[must_use]
    pub fn new(identifier: impl Into<String>, path_id: PathId) -> Self {
        Self {
            identifier: identifier.into(),
            path_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.path_id)
    }
}

/// Whether an entry records targets, a known-empty resolution or a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// At least one target
    Success,
    /// Upstream answered with nothing
    Negative,
    /// Upstream call failed
    Failed,
}

/// Stored resolution outcome
///
/// Owns its targets outright; callers only ever receive clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Kind of outcome recorded
    pub status: CacheStatus,
    /// Empty unless `status` is success
    pub targets: Vec<MappedTarget>,
    /// When the upstream call finished
    pub resolved_at: DateTime<Utc>,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
    /// Why a negative or failed entry has no targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CacheEntry {
    /// Successful resolution with at least one target
    #[must_use]
    pub fn success(targets: Vec<MappedTarget>, ttl: Duration) -> Self {
        Self {
            status: CacheStatus::Success,
            targets,
            resolved_at: Utc::now(),
            ttl_ms: duration_ms(ttl),
            reason: None,
        }
    }

    /// Empty resolution
    #[must_use]
    pub fn negative(reason: impl Into<String>, ttl: Duration) -> Self {
        Self {
            status: CacheStatus::Negative,
            targets: Vec::new(),
            resolved_at: Utc::now(),
            ttl_ms: duration_ms(ttl),
            reason: Some(reason.into()),
        }
    }

    /// Failed upstream call; `reason` keeps the client's message
    #[must_use]
    pub fn failed(reason: impl Into<String>, ttl: Duration) -> Self {
        Self {
            status: CacheStatus::Failed,
            ..Self::negative(reason, ttl)
        }
    }

    /// Time to live as a duration
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// `resolved_at + ttl`, saturating at the maximum timestamp
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|ttl| self.resolved_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expired relative to `now`
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Expired relative to the wall clock
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Entry carries no targets: an empty resolution or a failure
    #[inline]
    #[must_use]
    pub fn is_negative(&self) -> bool {
        matches!(self.status, CacheStatus::Negative | CacheStatus::Failed)
    }

    /// Entry records a failed upstream call
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == CacheStatus::Failed
    }
}

fn duration_ms(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_follows_ttl() {
        let entry = CacheEntry::success(vec![MappedTarget::exact("B1")], Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert!(entry.is_expired_at(entry.resolved_at + chrono::Duration::seconds(61)));
        assert!(!entry.is_negative());
    }

    #[test]
    fn negative_entry_has_no_targets() {
        let entry = CacheEntry::negative("upstream 500", Duration::from_secs(5));
        assert!(entry.is_negative());
        assert!(entry.targets.is_empty());
        assert_eq!(entry.reason.as_deref(), Some("upstream 500"));
        assert_eq!(entry.ttl(), Duration::from_secs(5));
        assert!(!entry.is_failure());
    }

    #[test]
    fn failed_entry_is_negative_and_a_failure() {
        let entry = CacheEntry::failed("connection reset", Duration::from_secs(5));
        assert!(entry.is_negative());
        assert!(entry.is_failure());
        assert_eq!(entry.status, CacheStatus::Failed);
        assert_eq!(entry.reason.as_deref(), Some("connection reset"));
    }

    #[test]
    fn huge_ttl_never_overflows() {
        let entry = CacheEntry::success(Vec::new(), Duration::MAX);
        assert!(!entry.is_expired());
    }
}
