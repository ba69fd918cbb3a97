//! Exponential retry backoff

use crate::config::RetryConfig;
use std::time::Duration;

/// Delay schedule between attempts of a failing step
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base_ms: f64,
    multiplier: f64,
    max_ms: f64,
    jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl Backoff {
    /// Schedule described by `config`; multipliers below 1 are raised to 1
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_ms: config.base_delay_ms as f64,
            multiplier: config.multiplier.max(1.0),
            max_ms: config.max_backoff_ms as f64,
            jitter: config.jitter,
        }
    }

    /// No delay at all, for tests and synchronous callers
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            base_ms: 0.0,
            multiplier: 1.0,
            max_ms: 0.0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// `base * multiplier^(retry - 1)`, capped at the maximum, then spread by
    /// up to 10% either way when jitter is on. Never exceeds the maximum.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut ms = self.base_ms * self.multiplier.powi(exponent);
        if !ms.is_finite() || ms > self.max_ms {
            ms = self.max_ms;
        }
        if self.jitter && ms > 0.0 {
            let spread = ms * 0.1;
            ms += (rand::random::<f64>() * 2.0 - 1.0) * spread;
        }
        Duration::from_millis(ms.clamp(0.0, self.max_ms).round() as u64)
    }
}
