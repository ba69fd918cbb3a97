//! Engine configuration
//!
//! Loaded from TOML; every field has a default so a partial document (or
//! none at all) is valid.
//!
//! ```toml
//! max_concurrency = 32
//! default_timeout_secs = 120.0
//!
//! [retry]
//! base_delay_ms = 250
//! multiplier = 2.0
//!
//! [cache]
//! negative_ttl_secs = 60
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```

use crate::error::ConfigError;
use biomap_actions::DEFAULT_MAX_CONCURRENCY;
use biomap_cache::CachePolicy;
use biomap_paths::DEFAULT_MAX_HOPS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Retry backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Growth factor per further retry
    pub multiplier: f64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
    /// Spread delays by up to 10% either way
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
            jitter: true,
        }
    }
}

/// Identifier cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of entries with targets
    pub success_ttl_secs: u64,
    /// Lifetime of empty and failed entries
    pub negative_ttl_secs: u64,
    /// How long a caller waits on someone else's in-flight resolution
    pub lock_timeout_ms: u64,
    /// Resolve directly instead of failing when that wait times out
    pub fallback_on_lock_timeout: bool,
    /// Entry bound for the in-memory store
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl_secs: 24 * 60 * 60,
            negative_ttl_secs: 5 * 60,
            lock_timeout_ms: 30_000,
            fallback_on_lock_timeout: true,
            max_capacity: 100_000,
        }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backoff schedule between attempts
    pub retry: RetryConfig,
    /// Timeout for steps that declare none; unset means unbounded
    pub default_timeout_secs: Option<f64>,
    /// Bound on an action's internal fan-out
    pub max_concurrency: usize,
    /// Longest resource chain the path finder will compose
    pub max_hops: usize,
    /// Identifier cache settings
    pub cache: CacheConfig,
    /// Tracing subscriber settings
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            default_timeout_secs: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_hops: DEFAULT_MAX_HOPS,
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults for every setting
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "retry.multiplier",
                "must be a finite number of at least 1.0",
            ));
        }
        if self.retry.max_backoff_ms < self.retry.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_backoff_ms",
                "must not be below retry.base_delay_ms",
            ));
        }
        if let Some(secs) = self.default_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::invalid(
                    "default_timeout_secs",
                    "must be a positive number of seconds",
                ));
            }
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be at least 1"));
        }
        if self.max_hops == 0 {
            return Err(ConfigError::invalid("max_hops", "must be at least 1"));
        }
        if self.cache.max_capacity == 0 {
            return Err(ConfigError::invalid("cache.max_capacity", "must be at least 1"));
        }
        Ok(())
    }

    /// Replace the backoff schedule
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bound steps that declare no timeout
    #[inline]
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// Bound on concurrent resolutions per action and per hop
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Longest resource chain the path finder composes
    #[inline]
    #[must_use]
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Replace the cache settings
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the logging settings
    #[inline]
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Timeout applied to steps without their own
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Cache manager policy from the `[cache]` section
    #[must_use]
    pub fn to_cache_policy(&self) -> CachePolicy {
        CachePolicy::default()
            .with_success_ttl(Duration::from_secs(self.cache.success_ttl_secs))
            .with_negative_ttl(Duration::from_secs(self.cache.negative_ttl_secs))
            .with_lock_timeout(Duration::from_millis(self.cache.lock_timeout_ms))
            .with_fallback_on_lock_timeout(self.cache.fallback_on_lock_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_concurrency = 4
            default_timeout_secs = 1.5

            [retry]
            base_delay_ms = 10
            jitter = false

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.retry.base_delay_ms, 10);
        assert!((config.retry.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(!config.retry.jitter);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn out_of_range_values_rejected() {
        let err = EngineConfig::from_toml_str("[retry]\nmultiplier = 0.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "retry.multiplier"));

        let err = EngineConfig::from_toml_str("max_hops = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "max_hops"));

        let err = EngineConfig::from_toml_str("default_timeout_secs = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("max_hops = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nnegative_ttl_secs = 7\nlock_timeout_ms = 50").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        let policy = config.to_cache_policy();
        assert_eq!(policy.negative_ttl, Duration::from_secs(7));
        assert_eq!(policy.lock_timeout, Duration::from_millis(50));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::from_file("/nonexistent/biomap.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
