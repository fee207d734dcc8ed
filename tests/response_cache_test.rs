//! Tests for [`ResponseCache`]: TTL memoization with FIFO eviction.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use mimir::MimirError;
use mimir::cache::{CacheConfig, ResponseCache, cache_key};

fn counting_producer(counter: &AtomicU32, value: &'static str) -> impl Future<Output = String> {
    counter.fetch_add(1, Ordering::SeqCst);
    async move { value.to_string() }
}

// =========================================================================
// CacheConfig
// =========================================================================

#[test]
fn cache_config_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.max_entries, 1_000);
    assert_eq!(config.ttl, Duration::from_secs(3600));
    assert!(config.enabled);
}

#[test]
fn cache_config_builder() {
    let config = CacheConfig::new()
        .max_entries(500)
        .ttl(Duration::from_secs(60))
        .enabled(false);
    assert_eq!(config.max_entries, 500);
    assert_eq!(config.ttl, Duration::from_secs(60));
    assert!(!config.enabled);
}

#[test]
fn cache_config_from_toml() {
    let config: CacheConfig = toml::from_str("ttl_secs = 90\nmax_entries = 7").unwrap();
    assert_eq!(config.ttl, Duration::from_secs(90));
    assert_eq!(config.max_entries, 7);
    assert!(config.enabled);
}

// =========================================================================
// get / TTL
// =========================================================================

#[tokio::test(start_paused = true)]
async fn producer_runs_once_within_ttl_and_again_after() {
    let cache = ResponseCache::new(&CacheConfig::new().ttl(Duration::from_secs(60)));
    let calls = AtomicU32::new(0);
    let key = cache_key("analyze", &["resume text"]);

    let a = cache.get_with(key, None, || counting_producer(&calls, "first")).await;
    let b = cache.get_with(key, None, || counting_producer(&calls, "second")).await;
    assert_eq!(a, "first");
    assert_eq!(b, "first");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    let c = cache.get_with(key, None, || counting_producer(&calls, "third")).await;
    assert_eq!(c, "third");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn per_call_ttl_overrides_default() {
    let cache = ResponseCache::new(&CacheConfig::new().ttl(Duration::from_secs(3600)));
    cache.set(1, "short".to_string(), Some(Duration::from_secs(5)));
    assert_eq!(cache.lookup(1).as_deref(), Some("short"));

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(cache.lookup(1), None);
    // expired entry is dropped on detection
    assert_eq!(cache.len(), 0);
}

#[tokio::test]
async fn errors_are_not_cached() {
    let cache: ResponseCache<String> = ResponseCache::new(&CacheConfig::default());
    let err = cache
        .get_or_try_insert_with(9, None, || async {
            Err::<String, _>(MimirError::TransientNetwork("reset".into()))
        })
        .await;
    assert!(err.is_err());
    assert!(cache.is_empty());

    let ok = cache
        .get_or_try_insert_with(9, None, || async { Ok::<_, MimirError>("v".to_string()) })
        .await
        .unwrap();
    assert_eq!(ok, "v");
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn disabled_cache_always_runs_producer() {
    let cache = ResponseCache::new(&CacheConfig::disabled());
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
        cache.get_with(1, None, || counting_producer(&calls, "v")).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(cache.is_empty());
}

// =========================================================================
// Eviction
// =========================================================================

#[tokio::test(start_paused = true)]
async fn insert_beyond_capacity_evicts_exactly_the_oldest() {
    let cache = ResponseCache::new(&CacheConfig::new().max_entries(3));
    for key in 1..=3u64 {
        cache.set(key, key, None);
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    cache.set(4, 4, None);

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.lookup(1), None);
    assert_eq!(cache.lookup(2), Some(2));
    assert_eq!(cache.lookup(3), Some(3));
    assert_eq!(cache.lookup(4), Some(4));
}

#[tokio::test(start_paused = true)]
async fn reads_do_not_protect_from_eviction() {
    let cache = ResponseCache::new(&CacheConfig::new().max_entries(2));
    cache.set(1, "a", None);
    tokio::time::advance(Duration::from_millis(10)).await;
    cache.set(2, "b", None);

    // A read of the oldest entry does not make it younger.
    assert_eq!(cache.lookup(1), Some("a"));
    cache.set(3, "c", None);

    assert_eq!(cache.lookup(1), None);
    assert_eq!(cache.lookup(2), Some("b"));
    assert_eq!(cache.lookup(3), Some("c"));
}

#[tokio::test(start_paused = true)]
async fn overwrite_resets_creation_time() {
    let cache = ResponseCache::new(&CacheConfig::new().max_entries(2));
    cache.set(1, "a", None);
    tokio::time::advance(Duration::from_millis(10)).await;
    cache.set(2, "b", None);
    tokio::time::advance(Duration::from_millis(10)).await;

    // Overwrite makes key 1 the youngest, so key 2 is evicted next.
    cache.set(1, "a2", None);
    assert_eq!(cache.len(), 2);
    assert!(cache.created_at(1) > cache.created_at(2));

    cache.set(3, "c", None);
    assert_eq!(cache.lookup(2), None);
    assert_eq!(cache.lookup(1), Some("a2"));
}

#[test]
fn clear_single_and_all() {
    let cache = ResponseCache::new(&CacheConfig::default());
    cache.set(1, 1, None);
    cache.set(2, 2, None);

    cache.clear(Some(1));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.lookup(2), Some(2));

    cache.clear(None);
    assert!(cache.is_empty());
}

#[test]
fn cache_key_separates_parts() {
    assert_ne!(cache_key("analyze", &["ab", "c"]), cache_key("analyze", &["a", "bc"]));
    assert_ne!(cache_key("analyze", &["x"]), cache_key("score", &["x"]));
}
