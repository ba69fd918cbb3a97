//! Cache errors

use biomap_core::{ActionError, ErrorKind, PathId};

/// Error from a cached resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Resolution known to produce nothing
    #[error("no mapping for '{identifier}' along path {path_id}")]
    NoMapping { identifier: String, path_id: PathId },

    /// Upstream failed within the negative TTL and was not retried
    #[error("resolution of '{identifier}' failed recently: {reason}")]
    RecentFailure { identifier: String, reason: String },

    /// Upstream client failed
    #[error("upstream resolution of '{identifier}' failed: {message}")]
    Upstream { identifier: String, message: String },

    /// Waiting on an in-flight resolution exceeded the lock timeout
    #[error("timed out after {waited_ms}ms waiting on in-flight resolution of '{identifier}'")]
    LockTimeout { identifier: String, waited_ms: u64 },
}

impl CacheError {
    /// Known-empty resolution, as opposed to a failure
    #[inline]
    #[must_use]
    pub fn is_no_mapping(&self) -> bool {
        matches!(self, Self::NoMapping { .. })
    }
}

impl From<CacheError> for ActionError {
    fn from(err: CacheError) -> Self {
        let kind = match &err {
            CacheError::LockTimeout { .. } => ErrorKind::CacheLockTimeout,
            CacheError::NoMapping { .. }
            | CacheError::RecentFailure { .. }
            | CacheError::Upstream { .. } => ErrorKind::Execution,
        };
        ActionError::Execution {
            kind,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_failure_surfaces_as_retryable_execution_error() {
        let err: ActionError = CacheError::RecentFailure {
            identifier: "P1".into(),
            reason: "connection reset".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn lock_timeout_keeps_its_kind() {
        let err: ActionError = CacheError::LockTimeout {
            identifier: "P1".into(),
            waited_ms: 10,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::CacheLockTimeout);
    }
}
