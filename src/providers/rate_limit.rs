//! Shared token/request quota with adaptive backoff.
//!
//! One [`RateLimiter`] models the quota of one upstream credential. Every
//! request, from every caller, passes through [`RateLimiter::acquire`],
//! which holds the window lock until the request's outcome is recorded on
//! the returned [`Permit`]. That makes admit → send → update a single
//! critical section: concurrent callers queue behind each other instead of
//! racing on the counters.
//!
//! # Admission
//!
//! 1. If the window is older than its duration, counters reset.
//! 2. If recent failures set a backoff deadline, wait for it.
//! 3. If the request would push tokens or requests over the window limit,
//!    wait for the window to reset, then re-check.
//!
//! Every wait is bounded: by the window duration, or by the capped backoff.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use super::retry::RetryConfig;
use crate::telemetry;
use crate::{MimirError, Result};

/// Per-window quota limits.
///
/// Defaults are modelled on a typical entry-tier provider quota:
/// 60,000 tokens and 60 requests per minute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum estimated tokens admitted per window.
    pub tokens_per_window: u64,
    /// Maximum requests admitted per window.
    pub requests_per_window: u32,
    /// Window length.
    #[serde(with = "crate::config::secs", rename = "window_secs")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_window: 60_000,
            requests_per_window: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens_per_window(mut self, tokens: u64) -> Self {
        self.tokens_per_window = tokens;
        self
    }

    pub fn requests_per_window(mut self, requests: u32) -> Self {
        self.requests_per_window = requests;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Quota counters for the current window.
///
/// Owned by the [`RateLimiter`]; callers only ever see copies via
/// [`RateLimiter::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub tokens_consumed: u64,
    pub requests_consumed: u32,
    pub window_started_at: Instant,
    pub last_request_at: Option<Instant>,
    pub consecutive_failures: u32,
    /// No request is admitted before this instant.
    pub backoff_until: Option<Instant>,
}

impl RateLimitWindow {
    fn new(now: Instant) -> Self {
        Self {
            tokens_consumed: 0,
            requests_consumed: 0,
            window_started_at: now,
            last_request_at: None,
            consecutive_failures: 0,
            backoff_until: None,
        }
    }

    fn reset(&mut self, now: Instant) {
        self.tokens_consumed = 0;
        self.requests_consumed = 0;
        self.window_started_at = now;
    }
}

/// Serialized admission gate over one [`RateLimitWindow`]. See module docs.
pub struct RateLimiter {
    config: RateLimitConfig,
    retry: RetryConfig,
    window: Mutex<RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, retry: RetryConfig) -> Self {
        let config = RateLimitConfig {
            tokens_per_window: config.tokens_per_window.max(1),
            requests_per_window: config.requests_per_window.max(1),
            window: config.window,
        };
        Self {
            config,
            retry,
            window: Mutex::new(RateLimitWindow::new(Instant::now())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Copy of the current counters. Waits for any in-flight request.
    pub async fn snapshot(&self) -> RateLimitWindow {
        *self.window.lock().await
    }

    /// Wait until a request costing `tokens` may be sent, and reserve it.
    ///
    /// The returned permit holds the gate: no other request is admitted
    /// until it is consumed or dropped. A request larger than the whole
    /// window can never be admitted and fails with `PayloadTooLarge`.
    pub async fn acquire(&self, tokens: u64) -> Result<Permit<'_>> {
        if tokens > self.config.tokens_per_window {
            return Err(MimirError::PayloadTooLarge(format!(
                "request needs {tokens} tokens, window allows {}",
                self.config.tokens_per_window
            )));
        }

        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            if now.duration_since(window.window_started_at) >= self.config.window {
                window.reset(now);
            }

            if let Some(until) = window.backoff_until
                && now < until
            {
                debug!(
                    failures = window.consecutive_failures,
                    wait_ms = (until - now).as_millis() as u64,
                    "waiting out backoff before admission"
                );
                sleep_until(until).await;
                continue;
            }

            let over_tokens = window.tokens_consumed + tokens > self.config.tokens_per_window;
            let over_requests = window.requests_consumed + 1 > self.config.requests_per_window;
            if over_tokens || over_requests {
                let reset_at = window.window_started_at + self.config.window;
                info!(
                    tokens_consumed = window.tokens_consumed,
                    requests_consumed = window.requests_consumed,
                    requested = tokens,
                    wait_ms = reset_at.saturating_duration_since(now).as_millis() as u64,
                    "rate limit window full, waiting for reset"
                );
                metrics::counter!(telemetry::RATE_LIMIT_WAITS_TOTAL).increment(1);
                sleep_until(reset_at).await;
                continue;
            }

            window.tokens_consumed += tokens;
            window.requests_consumed += 1;
            window.last_request_at = Some(now);
            metrics::counter!(telemetry::TOKENS_ADMITTED_TOTAL).increment(tokens);
            return Ok(Permit {
                window,
                retry: &self.retry,
                tokens,
            });
        }
    }
}

/// An admitted request. Holds the gate until its outcome is recorded.
pub struct Permit<'a> {
    window: MutexGuard<'a, RateLimitWindow>,
    retry: &'a RetryConfig,
    tokens: u64,
}

impl Permit<'_> {
    /// Tokens reserved for this request.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Failures recorded since the last success, before this request.
    pub fn consecutive_failures(&self) -> u32 {
        self.window.consecutive_failures
    }

    /// Window counters, including this request's reservation.
    pub fn window(&self) -> RateLimitWindow {
        *self.window
    }

    /// Clear the failure streak and any pending backoff.
    pub fn record_success(mut self) {
        self.window.consecutive_failures = 0;
        self.window.backoff_until = None;
    }

    /// Extend the failure streak and set the backoff deadline.
    ///
    /// Returns the backoff delay, measured from now.
    pub fn record_failure(mut self, retry_after: Option<Duration>) -> Duration {
        self.window.consecutive_failures = self.window.consecutive_failures.saturating_add(1);
        let delay = self
            .retry
            .backoff(self.window.consecutive_failures, retry_after);
        self.window.backoff_until = Some(Instant::now() + delay);
        delay
    }
}
