//! Tests for metrics emitted by the executor, limiter and cache.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

use mimir::providers::{
    CompletionProvider, Executor, ModelRoute, RateLimitConfig, RateLimiter, RetryConfig,
    UpstreamResponse,
};
use mimir::telemetry;
use mimir::types::{Chunk, CompletionRequest, RequestTemplate};
use mimir::{CacheConfig, MimirError, ResponseCache, Result};

// ============================================================================
// Mock providers
// ============================================================================

/// Fails the first `failures` requests with a rate limit, then answers.
struct FlakyProvider {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyProvider {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<UpstreamResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(MimirError::RateLimited { retry_after: None });
        }
        Ok(serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "{\"score\": 1}"}}]
        }))?)
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for `name` whose labels include `label = value`.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
fn record<F: Future>(fut: F) -> (F::Output, Snapshotter) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    });
    (output, snapshotter)
}

fn executor(provider: Arc<dyn CompletionProvider>, route: ModelRoute, attempts: u32) -> Executor {
    let limiter = Arc::new(RateLimiter::new(
        RateLimitConfig::default(),
        RetryConfig::new()
            .max_attempts(attempts)
            .initial_delay(Duration::from_millis(5))
            .jitter(Duration::ZERO),
    ));
    Executor::new(provider, limiter, route)
}

fn chunk() -> Chunk {
    Chunk {
        index: 0,
        text: "some text".into(),
        estimated_tokens: 3,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_chunk_records_request_metrics() {
    let executor = executor(FlakyProvider::new(0), ModelRoute::new("m"), 3);
    let (result, snapshotter) =
        record(executor.execute_chunk(&chunk(), &RequestTemplate::new("sys", 10)));
    assert!(result.is_success());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 0);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CHUNKS_TOTAL, "status", "ok"),
        1
    );
    assert!(counter_total(&snapshot, telemetry::TOKENS_ADMITTED_TOTAL) >= 10);
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn retries_are_counted() {
    let executor = executor(FlakyProvider::new(2), ModelRoute::new("m"), 3);
    let (result, snapshotter) =
        record(executor.execute_chunk(&chunk(), &RequestTemplate::new("sys", 10)));
    assert!(result.is_success());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 3);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "error"),
        2
    );
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn fallback_and_failed_chunk_are_counted() {
    let executor = executor(
        FlakyProvider::new(usize::MAX),
        ModelRoute::new("a").with_fallback("b"),
        1,
    );
    let (result, snapshotter) =
        record(executor.execute_chunk(&chunk(), &RequestTemplate::new("sys", 10)));
    assert!(!result.is_success());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::FALLBACKS_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CHUNKS_TOTAL, "status", "error"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "model", "b"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hits_misses_and_evictions() {
    let cache: ResponseCache<u32> = ResponseCache::new(&CacheConfig::new().max_entries(1));
    let (_, snapshotter) = record(async {
        cache.get_with(1, None, || async { 10 }).await;
        cache.get_with(1, None, || async { 11 }).await;
        cache.get_with(2, None, || async { 20 }).await;
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 2);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_EVICTIONS_TOTAL), 1);
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let executor = executor(FlakyProvider::new(0), ModelRoute::new("m"), 1);
    let result = executor
        .execute_chunk(&chunk(), &RequestTemplate::new("sys", 10))
        .await;
    assert!(result.is_success());
}
