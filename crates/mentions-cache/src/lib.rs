//! Process-wide TTL cache that deduplicates upstream fetches.
//!
//! Entries are keyed by a prefix plus the hash of the canonical JSON form of
//! the query parameters, so monitors watching the same terms share one
//! upstream call. Concurrent misses on one key wait for a single fetch.
//! The cache is advisory: a miss only costs latency.
//!
//! Lifecycle: construct with [`QueryCache::new`], start the TTL sweep with
//! [`QueryCache::spawn_sweeper`], and stop it with [`QueryCache::shutdown`].

mod key;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use key::cache_key;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    payload: T,
    created_at: Instant,
    expires_at: Instant,
    hits: u64,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    inflight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// A caller's claim on the in-flight slot for one key. The slot is dropped
/// from the map when its last claimant finishes, success or not.
struct Flight<'a, T> {
    inner: &'a Inner<T>,
    key: &'a str,
    slot: Arc<AsyncMutex<()>>,
}

impl<T> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        let mut inflight = lock(&self.inner.inflight);
        // Two references: ours and the map's.
        if inflight
            .get(self.key)
            .is_some_and(|s| Arc::ptr_eq(s, &self.slot) && Arc::strong_count(s) == 2)
        {
            inflight.remove(self.key);
        }
    }
}

/// Shared TTL cache. Cloning is cheap and every clone sees the same entries.
pub struct QueryCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + 'static> QueryCache<T> {
    /// Create an empty cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                sweeper: Mutex::new(None),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Serve `(prefix, params)` from cache, or call `fetch` and store its result.
    ///
    /// Returns the payload and whether it came from cache. Errors from
    /// `fetch` are returned as-is and never cached. If `params` cannot be
    /// serialized the call bypasses the cache.
    ///
    /// While one caller fetches a key, other callers missing on the same key
    /// wait and then read its result. If that fetch fails the next waiter
    /// fetches for itself.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `fetch`.
    pub async fn cached_query<P, F, Fut, E>(
        &self,
        prefix: &str,
        params: &P,
        ttl: Duration,
        fetch: F,
    ) -> Result<(T, bool), E>
    where
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match cache_key(prefix, params) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(prefix, error = %e, "cache key serialization failed; bypassing cache");
                return fetch().await.map(|data| (data, false));
            }
        };

        if let Some(payload) = self.lookup(&key) {
            return Ok((payload, true));
        }

        let flight = self.join_flight(&key);
        let _turn = flight.slot.lock().await;
        if let Some(payload) = self.lookup(&key) {
            return Ok((payload, true));
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let payload = fetch().await?;
        self.insert(key.clone(), payload.clone(), ttl);
        Ok((payload, false))
    }

    fn join_flight<'a>(&'a self, key: &'a str) -> Flight<'a, T> {
        let slot = lock(&self.inner.inflight)
            .entry(key.to_owned())
            .or_default()
            .clone();
        Flight {
            inner: &self.inner,
            key,
            slot,
        }
    }

    fn lookup(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = lock(&self.inner.entries);
        let entry = entries.get_mut(key)?;
        if entry.expires_at > now {
            entry.hits += 1;
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.payload.clone());
        }
        entries.remove(key);
        None
    }

    fn insert(&self, key: String, payload: T, ttl: Duration) {
        let now = Instant::now();
        let mut entries = lock(&self.inner.entries);
        if !entries.contains_key(&key) {
            while entries.len() >= self.inner.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(k, _)| k.clone());
                let Some(oldest) = oldest else { break };
                entries.remove(&oldest);
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                payload,
                created_at: now,
                expires_at: now + ttl,
                hits: 0,
            },
        );
    }

    /// Remove expired entries and return how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = lock(&self.inner.entries);
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            self.inner.evictions.fetch_add(
                u64::try_from(removed).unwrap_or(u64::MAX),
                Ordering::Relaxed,
            );
        }
        removed
    }

    /// Start the background TTL sweep. Replaces any sweeper already running.
    pub fn spawn_sweeper(&self, interval: Duration) {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "query cache sweep");
                }
            }
        });
        if let Some(previous) = lock(&self.inner.sweeper).replace(handle) {
            previous.abort();
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        lock(&self.inner.entries).clear();
    }

    /// Stop the sweeper and drop every entry.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.inner.sweeper).take() {
            handle.abort();
        }
        self.clear();
    }

    /// Hit count of the entry at `key`, if present.
    #[must_use]
    pub fn entry_hits(&self, key: &str) -> Option<u64> {
        lock(&self.inner.entries).get(key).map(|e| e.hits)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: lock(&self.inner.entries).len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use serde_json::json;

    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    async fn counted_fetch(
        cache: &QueryCache<u32>,
        calls: &Arc<AtomicU32>,
        params: serde_json::Value,
    ) -> (u32, bool) {
        let c = Arc::clone(calls);
        cache
            .cached_query("test", &params, TTL, || async move {
                Ok::<_, std::convert::Infallible>(c.fetch_add(1, Ordering::SeqCst))
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_once_within_ttl() {
        let cache = QueryCache::new(10);
        let calls = Arc::new(AtomicU32::new(0));

        let (first, hit1) = counted_fetch(&cache, &calls, json!({"a": 1, "b": 2})).await;
        tokio::time::advance(Duration::from_secs(599)).await;
        let (second, hit2) = counted_fetch(&cache, &calls, json!({"b": 2, "a": 1})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((first, hit1), (0, false));
        assert_eq!((second, hit2), (0, true));
        let key = cache_key("test", &json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(cache.entry_hits(&key), Some(1));
    }

    async fn slow_fetch(
        cache: &QueryCache<u32>,
        calls: &Arc<AtomicU32>,
        params: &serde_json::Value,
    ) -> (u32, bool) {
        let c = Arc::clone(calls);
        cache
            .cached_query("test", params, TTL, || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, std::convert::Infallible>(c.fetch_add(1, Ordering::SeqCst))
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let cache = QueryCache::new(10);
        let calls = Arc::new(AtomicU32::new(0));
        let params = json!({"q": "acme"});

        let (a, b) = tokio::join!(
            slow_fetch(&cache, &calls, &params),
            slow_fetch(&cache, &calls, &params),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((a.0, b.0), (0, 0));
        assert_eq!(u8::from(a.1) + u8::from(b.1), 1, "exactly one caller waited");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!(lock(&cache.inner.inflight).is_empty());
    }

    #[tokio::test]
    async fn waiter_fetches_itself_after_a_failed_flight() {
        let cache: QueryCache<u32> = QueryCache::new(10);
        let params = json!({});
        let failing = cache.cached_query("test", &params, TTL, || async {
            tokio::task::yield_now().await;
            Err::<u32, &str>("boom")
        });
        let succeeding = cache.cached_query("test", &params, TTL, || async { Ok::<u32, &str>(7) });

        let (first, second) = tokio::join!(failing, succeeding);
        assert_eq!(first.unwrap_err(), "boom");
        assert_eq!(second.unwrap(), (7, false));
        assert!(lock(&cache.inner.inflight).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_after_ttl() {
        let cache = QueryCache::new(10);
        let calls = Arc::new(AtomicU32::new(0));

        counted_fetch(&cache, &calls, json!({"a": 1})).await;
        tokio::time::advance(TTL).await;
        let (value, hit) = counted_fetch(&cache, &calls, json!({"a": 1})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((value, hit), (1, false));
    }

    #[tokio::test]
    async fn fetch_errors_are_not_cached() {
        let cache: QueryCache<u32> = QueryCache::new(10);
        let err = cache
            .cached_query("test", &json!({}), TTL, || async { Err::<u32, &str>("boom") })
            .await;
        assert_eq!(err.unwrap_err(), "boom");

        let (value, hit) = cache
            .cached_query("test", &json!({}), TTL, || async { Ok::<u32, &str>(9) })
            .await
            .unwrap();
        assert_eq!((value, hit), (9, false));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest_created_first() {
        let cache = QueryCache::new(2);
        let calls = Arc::new(AtomicU32::new(0));

        counted_fetch(&cache, &calls, json!({"k": 1})).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        counted_fetch(&cache, &calls, json!({"k": 2})).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touching the oldest entry does not protect it.
        counted_fetch(&cache, &calls, json!({"k": 1})).await;
        counted_fetch(&cache, &calls, json!({"k": 3})).await;

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 1);
        let (_, hit) = counted_fetch(&cache, &calls, json!({"k": 1})).await;
        assert!(!hit, "oldest entry should have been evicted");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_entries() {
        let cache = QueryCache::new(10);
        let calls = Arc::new(AtomicU32::new(0));
        cache.spawn_sweeper(Duration::from_secs(60));

        counted_fetch(&cache, &calls, json!({"a": 1})).await;
        assert_eq!(cache.stats().entries, 1);

        tokio::time::advance(TTL + Duration::from_secs(61)).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.stats().entries, 0);
        cache.shutdown();
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = QueryCache::new(10);
        let calls = Arc::new(AtomicU32::new(0));
        counted_fetch(&cache, &calls, json!({"a": 1})).await;
        cache.clear();
        let (_, hit) = counted_fetch(&cache, &calls, json!({"a": 1})).await;
        assert!(!hit);
    }
}
