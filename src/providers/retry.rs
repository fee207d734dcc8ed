//! Retry configuration and backoff delay calculation.
//!
//! [`RetryConfig`] bounds how many attempts the [`Executor`](super::Executor)
//! makes against each model, and computes the delay inserted after a run
//! of consecutive failures: exponential in the failure count, capped, plus
//! a bounded random jitter.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use mimir::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(Duration::ZERO);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per model (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay after the first failure. Doubles with each further
    /// consecutive failure. Default: 500ms.
    #[serde(with = "crate::config::millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Cap on the exponential part of the delay. Default: 30s.
    #[serde(with = "crate::config::millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Upper bound of the random jitter added on top. Default: 250ms.
    #[serde(with = "crate::config::millis", rename = "jitter_ms")]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt per model).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts per model (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the delay after the first failure.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap on the exponential delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter bound. `Duration::ZERO` disables jitter.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic backoff for `failures` consecutive failures.
    ///
    /// `0` → no delay; `n` → `initial_delay * 2^(n-1)`, capped at `max_delay`.
    /// Non-decreasing in `failures`.
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = failures.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }

    /// Full backoff: the deterministic delay plus jitter in `[0, jitter]`.
    ///
    /// A `Retry-After` hint from the upstream raises the delay to at least
    /// the hint, itself capped at `max_delay` so no wait is unbounded.
    pub fn backoff(&self, failures: u32, retry_after: Option<Duration>) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let base = self.delay_for_failures(failures);
        let hinted = retry_after.map_or(base, |hint| base.max(hint.min(self.max_delay)));
        hinted + self.sample_jitter()
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        self.jitter.mul_f64(rand::random::<f64>())
    }
}
