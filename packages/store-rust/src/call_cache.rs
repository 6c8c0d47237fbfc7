//! Generic keyed call cache with TTL and LRU eviction.
//!
//! Keys are arbitrary serializable values, canonicalized to a stable JSON
//! string. A lookup returns a live entry without running the source; a miss
//! runs the source once and every concurrent caller for the same key awaits
//! that one execution. Successful values are stored with the insertion
//! time; failures are never stored.
//!
//! Expiry is lazy: an entry older than its time-to-live is dropped on the
//! next lookup. Eviction removes the least recently *accessed* entry once a
//! store would exceed the size limit.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tessera_core::{ClockSource, SystemClock};
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::CacheError;

type SharedCall<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

/// Per-call overrides of the cache configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Time-to-live of the stored value. Falls back to the cache config.
    pub expires: Option<Duration>,
    /// Size limit applied when storing. Falls back to the cache config.
    pub max_cache_size: Option<usize>,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: u64,
    last_accessed: u64,
    access_seq: u64,
    ttl_ms: Option<u64>,
}

struct InFlight<V> {
    id: u64,
    call: SharedCall<V>,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    in_flight: HashMap<String, InFlight<V>>,
    seq: u64,
}

impl<V: Clone> CacheState<V> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Returns a live value and refreshes its recency. Expired entries are
    /// removed.
    fn lookup(&mut self, key: &str, now: u64) -> Option<V> {
        let entry = self.entries.get(key)?;
        let expired = entry
            .ttl_ms
            .is_some_and(|ttl| now.saturating_sub(entry.inserted_at) > ttl);
        if expired {
            self.entries.remove(key);
            debug!(key, "cache entry expired");
            return None;
        }
        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_seq = seq;
        Some(entry.value.clone())
    }

    fn store(&mut self, key: String, value: V, now: u64, ttl_ms: Option<u64>, limit: usize) {
        let access_seq = self.next_seq();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed: now,
                access_seq,
                ttl_ms,
            },
        );
        while self.entries.len() > limit.max(1) {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_seq)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
            debug!(key = %oldest, "evicted least recently accessed cache entry");
        }
    }
}

/// A keyed cache for the results of async calls.
///
/// Cheap to clone; clones share entries and in-flight calls.
pub struct CallCache<V> {
    inner: Arc<Mutex<CacheState<V>>>,
    config: CacheConfig,
    clock: Arc<dyn ClockSource>,
}

impl<V> Clone for CallCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> CallCache<V> {
    /// Creates a cache on the system clock.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache measuring age with `clock`.
    #[must_use]
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                seq: 0,
            })),
            config,
            clock,
        }
    }

    /// Returns the cached value for `key`, or runs `source` to produce it.
    ///
    /// `source` is only invoked on a miss with no call in flight for the
    /// key. It must not use this cache synchronously; its future may.
    ///
    /// # Errors
    ///
    /// [`CacheError::Key`] if `key` cannot be serialized;
    /// [`CacheError::Source`] if the source failed, shared by every caller
    /// coalesced onto it.
    pub async fn cache<K, S, Fut>(
        &self,
        key: &K,
        options: CacheOptions,
        source: S,
    ) -> Result<V, CacheError>
    where
        K: Serialize + ?Sized,
        S: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let expires = options.expires.or(self.config.expires);
        let limit = options.max_cache_size.unwrap_or(self.config.max_cache_size);
        self.run(key, expires, limit, source).await
    }

    /// Call-style variant of [`cache`](Self::cache): values never expire and
    /// are bounded only by the configured size.
    ///
    /// # Errors
    ///
    /// As for [`cache`](Self::cache).
    pub async fn cache_call<K, S, Fut>(&self, key: &K, call: S) -> Result<V, CacheError>
    where
        K: Serialize + ?Sized,
        S: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.run(key, None, self.config.max_cache_size, call).await
    }

    async fn run<K, S, Fut>(
        &self,
        key: &K,
        expires: Option<Duration>,
        limit: usize,
        source: S,
    ) -> Result<V, CacheError>
    where
        K: Serialize + ?Sized,
        S: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let key = canonical_key(key)?;
        let call = {
            let mut state = self.inner.lock();
            if let Some(value) = state.lookup(&key, self.clock.now()) {
                debug!(key = %key, "cache hit");
                return Ok(value);
            }
            if let Some(in_flight) = state.in_flight.get(&key) {
                debug!(key = %key, "joining in-flight call");
                in_flight.call.clone()
            } else {
                debug!(key = %key, "cache miss");
                let id = state.next_seq();
                let call = self.shared_call(key.clone(), id, expires, limit, source());
                state.in_flight.insert(
                    key,
                    InFlight {
                        id,
                        call: call.clone(),
                    },
                );
                call
            }
        };
        call.await
    }

    /// Wraps `future` so that whichever caller drives it to completion also
    /// records the outcome.
    fn shared_call<Fut>(
        &self,
        key: String,
        id: u64,
        expires: Option<Duration>,
        limit: usize,
        future: Fut,
    ) -> SharedCall<V>
    where
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        let ttl_ms = expires.map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        async move {
            let result = future.await.map_err(|err| CacheError::Source(Arc::new(err)));
            let mut state = inner.lock();
            let current = state
                .in_flight
                .get(&key)
                .is_some_and(|in_flight| in_flight.id == id);
            if current {
                state.in_flight.remove(&key);
            }
            match &result {
                Ok(value) if current => {
                    state.store(key, value.clone(), clock.now(), ttl_ms, limit);
                }
                Ok(_) => debug!(key = %key, "key invalidated during call, not storing"),
                Err(err) => debug!(key = %key, %err, "call failed, not caching"),
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drops the entry for `key` and detaches any call in flight for it, so
    /// its result is not stored. Returns whether an entry was removed.
    ///
    /// # Errors
    ///
    /// [`CacheError::Key`] if `key` cannot be serialized.
    pub fn invalidate<K: Serialize + ?Sized>(&self, key: &K) -> Result<bool, CacheError> {
        let key = canonical_key(key)?;
        let mut state = self.inner.lock();
        state.in_flight.remove(&key);
        Ok(state.entries.remove(&key).is_some())
    }

    /// Drops every entry and detaches every call in flight.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.in_flight.clear();
    }

    /// Number of stored entries, expired ones included until looked up.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Whether `key` has a stored entry, without touching its recency.
    ///
    /// # Errors
    ///
    /// [`CacheError::Key`] if `key` cannot be serialized.
    pub fn contains<K: Serialize + ?Sized>(&self, key: &K) -> Result<bool, CacheError> {
        let key = canonical_key(key)?;
        Ok(self.inner.lock().entries.contains_key(&key))
    }

    /// Milliseconds since `key` was last read or stored.
    ///
    /// # Errors
    ///
    /// [`CacheError::Key`] if `key` cannot be serialized.
    pub fn idle_millis<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<u64>, CacheError> {
        let key = canonical_key(key)?;
        let now = self.clock.now();
        Ok(self
            .inner
            .lock()
            .entries
            .get(&key)
            .map(|entry| now.saturating_sub(entry.last_accessed)))
    }
}

/// Stable string form of a key. Object keys serialize in sorted order.
fn canonical_key<K: Serialize + ?Sized>(key: &K) -> Result<String, CacheError> {
    serde_json::to_value(key)
        .map(|value| value.to_string())
        .map_err(|err| CacheError::Key(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use tessera_core::ManualClock;

    use super::*;

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl Future<Output = anyhow::Result<u32>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(value)
        }
    }

    fn sized(max_cache_size: usize) -> CacheOptions {
        CacheOptions {
            max_cache_size: Some(max_cache_size),
            ..CacheOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_execution() {
        let cache = CallCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = ("products", 7);
        let (a, b) = tokio::join!(
            cache.cache(&key, sized(3), || counted(&calls, 70)),
            cache.cache(&key, sized(3), || counted(&calls, 71)),
        );
        assert_eq!(a.unwrap(), 70);
        assert_eq!(b.unwrap(), 70);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = cache.cache(&key, sized(3), || counted(&calls, 72)).await;
        assert_eq!(c.unwrap(), 70);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn least_recently_accessed_entry_is_evicted() {
        let cache = CallCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        for id in 0..3_u32 {
            cache.cache(&id, sized(3), || counted(&calls, id)).await.unwrap();
        }
        cache.cache(&0_u32, sized(3), || counted(&calls, 0)).await.unwrap();
        cache.cache(&3_u32, sized(3), || counted(&calls, 3)).await.unwrap();

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&0_u32).unwrap());
        assert!(!cache.contains(&1_u32).unwrap());
        assert!(cache.contains(&2_u32).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_refetched() {
        let clock = ManualClock::new(1_000);
        let cache = CallCache::with_clock(CacheConfig::default(), Arc::new(clock.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions {
            expires: Some(Duration::from_millis(500)),
            max_cache_size: None,
        };
        cache.cache("k", options, || counted(&calls, 1)).await.unwrap();
        clock.advance(500);
        cache.cache("k", options, || counted(&calls, 2)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(1);
        let value = cache.cache("k", options, || counted(&calls, 3)).await.unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let cache: CallCache<u32> = CallCache::new(CacheConfig::default());
        let err = cache
            .cache("k", CacheOptions::default(), || async {
                Err::<u32, _>(anyhow::anyhow!("unavailable"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Source(_)));
        assert!(cache.is_empty());

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache
            .cache("k", CacheOptions::default(), || counted(&calls, 9))
            .await
            .unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn composite_keys_are_canonical() {
        let cache = CallCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut first = BTreeMap::new();
        first.insert("b", 2);
        first.insert("a", 1);
        let second = serde_json::json!({ "a": 1, "b": 2 });
        cache
            .cache(&first, CacheOptions::default(), || counted(&calls, 1))
            .await
            .unwrap();
        cache
            .cache(&second, CacheOptions::default(), || counted(&calls, 2))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_forces_a_new_call() {
        let cache = CallCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache.cache_call("k", || counted(&calls, 1)).await.unwrap();
        assert!(cache.invalidate("k").unwrap());
        assert!(!cache.invalidate("k").unwrap());
        assert_eq!(cache.cache_call("k", || counted(&calls, 2)).await.unwrap(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn inserting_n_plus_one_keys_evicts_exactly_the_lru(
            limit in 1_usize..8,
            touched in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            runtime.block_on(async {
                let cache = CallCache::new(CacheConfig::default());
                let mut recency: Vec<usize> = Vec::new();
                for key in 0..limit {
                    cache
                        .cache(&key, sized(limit), || async move { Ok::<_, anyhow::Error>(key) })
                        .await
                        .unwrap();
                    recency.push(key);
                }
                for index in &touched {
                    let key = recency[index.index(recency.len())];
                    cache
                        .cache(&key, sized(limit), || async move { Ok::<_, anyhow::Error>(key) })
                        .await
                        .unwrap();
                    recency.retain(|k| *k != key);
                    recency.push(key);
                }
                cache
                    .cache(&limit, sized(limit), || async move { Ok::<_, anyhow::Error>(limit) })
                    .await
                    .unwrap();
                let victim = recency[0];
                for key in 0..=limit {
                    assert_eq!(cache.contains(&key).unwrap(), key != victim);
                }
            });
        }
    }
}
