//! Response cache for completed analyses.
//!
//! [`ResponseCache`] memoizes `(request → response)` pairs keyed on a
//! content hash of the operation, the content and every parameter that
//! can change the answer. A hit bypasses chunking, rate limiting and the
//! network entirely.
//!
//! # Eviction
//!
//! Entries expire `ttl` after creation; expiry is detected lazily on the
//! next lookup. When an insert would exceed `max_entries`, exactly one
//! entry is evicted: the one created earliest. Reads do not refresh an
//! entry's position, so eviction is FIFO by creation time rather than
//! access recency.
//!
//! # Concurrency
//!
//! The map is guarded by a mutex that is never held across an `.await`.
//! Two concurrent misses on the same key both run their producer; the
//! later insert replaces the earlier one wholesale.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;

/// Configuration for the response cache.
///
/// ```rust
/// # use mimir::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 1,000.
    pub max_entries: usize,
    /// Default time-to-live for entries. Default: 1 hour.
    #[serde(with = "crate::config::secs", rename = "ttl_secs")]
    pub ttl: Duration,
    /// When false, lookups always run the producer and nothing is stored.
    /// Default: true.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that bypasses the cache entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable caching.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A stored value. Replaced wholesale on overwrite, never mutated.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    expires_at: Instant,
    /// Insertion sequence number, used to find the oldest entry.
    seq: u64,
}

impl<T> CacheEntry<T> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Entries<T> {
    map: HashMap<u64, CacheEntry<T>>,
    /// Insertion sequence → key. The first element is the oldest entry.
    order: BTreeMap<u64, u64>,
    next_seq: u64,
}

impl<T> Entries<T> {
    fn remove(&mut self, key: u64) -> Option<CacheEntry<T>> {
        let entry = self.map.remove(&key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<u64> {
        let (_, key) = self.order.pop_first()?;
        self.map.remove(&key);
        Some(key)
    }
}

/// In-memory TTL cache with FIFO eviction. See module docs.
pub struct ResponseCache<T> {
    entries: Mutex<Entries<T>>,
    config: CacheConfig,
}

impl<T: Clone> ResponseCache<T> {
    /// Create a new response cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            config: config.clone(),
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry without producing one.
    ///
    /// An expired entry found here is removed. Emits cache hit/miss metrics.
    pub fn lookup(&self, key: u64) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.lock();
        let hit = match entries.map.get(&key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "cache entry expired");
                None
            }
            None => None,
        };
        drop(entries);

        if hit.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        }
        hit
    }

    /// Store `value` under `key`, expiring after `ttl` (or the default).
    ///
    /// Overwriting an existing key replaces the entry and resets its
    /// creation time. Inserting a new key into a full cache evicts the
    /// oldest entry first.
    pub fn set(&self, key: u64, value: T, ttl: Option<Duration>) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.config.ttl);
        let mut entries = self.lock();

        if entries.remove(key).is_none() && entries.map.len() >= self.config.max_entries {
            if let Some(evicted) = entries.evict_oldest() {
                debug!(evicted, "cache full, evicted oldest entry");
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
            }
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.order.insert(seq, key);
        entries.map.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                seq,
            },
        );
    }

    /// Return the cached value for `key`, or run `producer`, store and
    /// return its output.
    pub async fn get_with<F, Fut>(&self, key: u64, ttl: Option<Duration>, producer: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let result: Result<T, Infallible> = self
            .get_or_try_insert_with(key, ttl, || async { Ok(producer().await) })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_with`](Self::get_with), but for fallible producers.
    ///
    /// Errors are returned to the caller and never cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: u64,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }
        let value = producer().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Remove one entry, or every entry when `key` is `None`.
    pub fn clear(&self, key: Option<u64>) {
        let mut entries = self.lock();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => {
                entries.map.clear();
                entries.order.clear();
            }
        }
    }

    /// Number of stored entries, including expired ones not yet detected.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creation time of the entry under `key`, if present.
    pub fn created_at(&self, key: u64) -> Option<Instant> {
        self.lock().map.get(&key).map(|e| e.created_at)
    }
}

/// Compute a cache key from an operation name and input strings.
///
/// Uses `DefaultHasher` (SipHash). The hash is deterministic within a
/// process lifetime, which is sufficient for an in-memory cache. Each part
/// is hashed with its length so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn cache_key(operation: &str, parts: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    operation.hash(&mut hasher);
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_deterministic() {
        let k1 = cache_key("analyze", &["hello", "params"]);
        let k2 = cache_key("analyze", &["hello", "params"]);
        assert_eq!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_operation() {
        let k1 = cache_key("analyze", &["hello"]);
        let k2 = cache_key("score", &["hello"]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_input() {
        let k1 = cache_key("analyze", &["hello"]);
        let k2 = cache_key("analyze", &["world"]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_part_boundaries_matter() {
        let k1 = cache_key("analyze", &["ab", "c"]);
        let k2 = cache_key("analyze", &["a", "bc"]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn overwrite_keeps_single_entry() {
        let cache = ResponseCache::new(&CacheConfig::new());
        cache.set(1, "a", None);
        cache.set(1, "b", None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(1), Some("b"));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = ResponseCache::new(&CacheConfig::new().max_entries(0));
        cache.set(1, "a", None);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_single_key() {
        let cache = ResponseCache::new(&CacheConfig::new());
        cache.set(1, "a", None);
        cache.set(2, "b", None);
        cache.clear(Some(1));
        assert_eq!(cache.lookup(1), None);
        assert_eq!(cache.lookup(2), Some("b"));
    }

    #[test]
    fn clear_all() {
        let cache = ResponseCache::new(&CacheConfig::new());
        cache.set(1, "a", None);
        cache.set(2, "b", None);
        cache.clear(None);
        assert!(cache.is_empty());
    }
}
