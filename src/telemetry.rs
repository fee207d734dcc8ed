//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "openrouter", "gemini")
//! - `model`: model identifier the request was sent to
//! - `status`: outcome: "ok" or "error"

/// Total upstream requests sent by the executor.
///
/// Labels: `provider`, `model`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "mimir_requests_total";

/// Upstream request duration in seconds.
///
/// Labels: `provider`, `model`.
pub const REQUEST_DURATION_SECONDS: &str = "mimir_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `model`.
pub const RETRIES_TOTAL: &str = "mimir_retries_total";

/// Total switches from the primary to the fallback model.
///
/// Labels: `provider`.
pub const FALLBACKS_TOTAL: &str = "mimir_fallbacks_total";

/// Total times admission waited for the rate-limit window to reset.
pub const RATE_LIMIT_WAITS_TOTAL: &str = "mimir_rate_limit_waits_total";

/// Total estimated tokens admitted through the rate limiter.
pub const TOKENS_ADMITTED_TOTAL: &str = "mimir_tokens_admitted_total";

/// Total chunks executed.
///
/// Labels: `status` ("ok" | "error").
pub const CHUNKS_TOTAL: &str = "mimir_chunks_total";

/// Total cache hits.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total cache misses.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Total entries evicted because the cache was full.
pub const CACHE_EVICTIONS_TOTAL: &str = "mimir_cache_evictions_total";
