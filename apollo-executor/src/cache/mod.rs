use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::oneshot;
use tokio::sync::Mutex;

use self::storage::CacheMetrics;
use self::storage::InMemoryCache;
use self::storage::KeyType;
use self::storage::ValueType;

pub(crate) mod storage;

type WaitMap<K, V> = Arc<Mutex<HashMap<K, broadcast::Sender<V>>>>;

/// A cache that computes each missing value once.
///
/// The first caller asking for a missing key gets an [`Entry`] it must fill;
/// concurrent callers for the same key wait for that value instead of
/// computing it again.
#[derive(Clone)]
pub(crate) struct DeduplicatingCache<K: KeyType, V: ValueType> {
    wait_map: WaitMap<K, V>,
    storage: InMemoryCache<K, V>,
}

impl<K, V> DeduplicatingCache<K, V>
where
    K: KeyType + 'static,
    V: ValueType + 'static,
{
    pub(crate) fn new(capacity: NonZeroUsize, ttl: Option<Duration>) -> Self {
        Self {
            wait_map: Arc::new(Mutex::new(HashMap::new())),
            storage: InMemoryCache::new(capacity, ttl),
        }
    }

    pub(crate) async fn get(&self, key: &K) -> Entry<K, V> {
        let mut locked_wait_map = self.wait_map.lock().await;
        match locked_wait_map.get(key) {
            Some(waiter) => {
                // Register interest in key
                let receiver = waiter.subscribe();
                Entry {
                    inner: EntryInner::Receiver { receiver },
                }
            }
            None => {
                if let Some(value) = self.storage.get(key).await {
                    self.storage.record_hit();
                    return Entry {
                        inner: EntryInner::Value(value),
                    };
                }
                self.storage.record_miss();

                let (sender, _receiver) = broadcast::channel(1);
                locked_wait_map.insert(key.clone(), sender.clone());
                drop(locked_wait_map);

                let k = key.clone();
                let registered = sender.clone();
                // when _drop_signal is dropped, either by inserting the value or by
                // cancellation of the first caller, the drop_sentinel future will
                // return with Err(), then we remove the entry from the wait map
                let (_drop_signal, drop_sentinel) = oneshot::channel::<()>();
                let wait_map = self.wait_map.clone();
                tokio::task::spawn(async move {
                    let _ = drop_sentinel.await;
                    let mut locked_wait_map = wait_map.lock().await;
                    if locked_wait_map
                        .get(&k)
                        .is_some_and(|current| current.same_channel(&registered))
                    {
                        let _ = locked_wait_map.remove(&k);
                    }
                });

                Entry {
                    inner: EntryInner::First {
                        sender,
                        key: key.clone(),
                        cache: self.clone(),
                        _drop_signal,
                    },
                }
            }
        }
    }

    pub(crate) async fn insert(&self, key: K, value: V) {
        self.storage.insert(key, value).await;
    }

    async fn remove_wait(&self, key: &K) {
        let mut locked_wait_map = self.wait_map.lock().await;
        let _ = locked_wait_map.remove(key);
    }

    pub(crate) async fn clear(&self) {
        self.storage.clear().await;
    }

    pub(crate) async fn len(&self) -> usize {
        self.storage.len().await
    }

    pub(crate) async fn metrics(&self) -> CacheMetrics {
        self.storage.metrics().await
    }

    pub(crate) fn record_hit(&self) {
        self.storage.record_hit();
    }
}

pub(crate) struct Entry<K: KeyType, V: ValueType> {
    inner: EntryInner<K, V>,
}

enum EntryInner<K: KeyType, V: ValueType> {
    First {
        key: K,
        sender: broadcast::Sender<V>,
        cache: DeduplicatingCache<K, V>,
        _drop_signal: oneshot::Sender<()>,
    },
    Receiver {
        receiver: broadcast::Receiver<V>,
    },
    Value(V),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryError {
    /// `get` was called on the entry of the first caller
    IsFirst,
    /// the first caller went away without providing a value
    Closed,
}

impl<K, V> Entry<K, V>
where
    K: KeyType + 'static,
    V: ValueType + 'static,
{
    pub(crate) fn is_first(&self) -> bool {
        matches!(self.inner, EntryInner::First { .. })
    }

    /// Whether this caller waits for a value computed by another caller.
    pub(crate) fn is_waiting(&self) -> bool {
        matches!(self.inner, EntryInner::Receiver { .. })
    }

    pub(crate) async fn get(self) -> Result<V, EntryError> {
        match self.inner {
            // there was already a value in cache
            EntryInner::Value(v) => Ok(v),
            EntryInner::Receiver { mut receiver } => {
                receiver.recv().await.map_err(|_| EntryError::Closed)
            }
            EntryInner::First { .. } => Err(EntryError::IsFirst),
        }
    }

    pub(crate) async fn insert(self, value: V) {
        if let EntryInner::First {
            key,
            sender,
            cache,
            _drop_signal,
        } = self.inner
        {
            cache.insert(key.clone(), value.clone()).await;
            cache.remove_wait(&key).await;
            let _ = sender.send(value);
        }
    }
}
