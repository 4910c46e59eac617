use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub(crate) trait KeyType: Clone + fmt::Debug + Hash + Eq + Send + Sync {}
pub(crate) trait ValueType: Clone + Send + Sync {}

// Blanket implementation which satisfies the compiler
impl<K> KeyType for K
where
    K: Clone + fmt::Debug + Hash + Eq + Send + Sync,
{
    // Nothing to implement, since K already supports the other traits.
    // It has the functions it needs already
}

// Blanket implementation which satisfies the compiler
impl<V> ValueType for V
where
    V: Clone + Send + Sync,
{
    // Nothing to implement, since V already supports the other traits.
    // It has the functions it needs already
}

struct Stored<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Default)]
struct Stats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Counters of a cache, read with [`InMemoryCache::metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because of the capacity limit or their time to live.
    pub evictions: u64,
    pub size: usize,
    /// `hits / (hits + misses)`, 0 when the cache was never queried.
    pub hit_rate: f64,
}

/// An in memory LRU cache whose entries optionally expire.
///
/// Expired entries are removed lazily, when they are looked up.
#[derive(Clone)]
pub(crate) struct InMemoryCache<K: KeyType, V: ValueType> {
    inner: Arc<Mutex<LruCache<K, Stored<V>>>>,
    ttl: Option<Duration>,
    stats: Arc<Stats>,
}

impl<K, V> InMemoryCache<K, V>
where
    K: KeyType,
    V: ValueType,
{
    pub(crate) fn new(max_capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(max_capacity))),
            ttl,
            stats: Default::default(),
        }
    }

    /// Returns the value without counting a hit or a miss.
    pub(crate) async fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().await;
        let expired = match (guard.peek(key), self.ttl) {
            (Some(stored), Some(ttl)) => stored.inserted_at.elapsed() >= ttl,
            _ => false,
        };
        if expired {
            guard.pop(key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache entry {key:?} expired");
            return None;
        }
        guard.get(key).map(|stored| stored.value.clone())
    }

    pub(crate) async fn insert(&self, key: K, value: V) {
        let stored = Stored {
            value,
            inserted_at: Instant::now(),
        };
        let mut guard = self.inner.lock().await;
        if let Some((evicted, _)) = guard.push(key.clone(), stored) {
            if evicted != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache entry {evicted:?} evicted");
            }
        }
    }

    pub(crate) async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub(crate) fn record_hit(&self) {
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) async fn metrics(&self) -> CacheMetrics {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetrics {
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.len().await,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn least_recently_used_entries_are_evicted() {
        let cache: InMemoryCache<&str, u32> = InMemoryCache::new(capacity(2), None);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        cache.insert("c", 3).await;

        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"c").await, Some(3));
        assert_eq!(cache.metrics().await.evictions, 1);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn replacing_a_value_is_not_an_eviction() {
        let cache: InMemoryCache<&str, u32> = InMemoryCache::new(capacity(1), None);
        cache.insert("a", 1).await;
        cache.insert("a", 2).await;
        assert_eq!(cache.get(&"a").await, Some(2));
        assert_eq!(cache.metrics().await.evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache: InMemoryCache<&str, u32> =
            InMemoryCache::new(capacity(4), Some(Duration::from_secs(10)));
        cache.insert("a", 1).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(&"a").await, Some(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.metrics().await.evictions, 1);
    }

    #[tokio::test]
    async fn hit_rate() {
        let cache: InMemoryCache<&str, u32> = InMemoryCache::new(capacity(4), None);
        assert_eq!(cache.metrics().await.hit_rate, 0.0);
        cache.record_hit();
        cache.record_hit();
        cache.record_hit();
        cache.record_miss();
        let metrics = cache.metrics().await;
        assert_eq!((metrics.hits, metrics.misses), (3, 1));
        assert_eq!(metrics.hit_rate, 0.75);
    }
}
