//! Volatile cache and memoized computations.
//!
//! The cache is best-effort: it may drop entries at any time and its failures
//! never reach callers. Values are postcard-encoded bytes so any backend
//! holding opaque blobs can stand in for [`MemoryCache`].

use crate::error::CacheError;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lru::LruCache;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key/value byte cache that may lose entries at any time.
#[async_trait]
pub trait VolatileCache: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Bounded in-process LRU cache.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Vec<u8>>>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache").finish_non_exhaustive()
    }
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl VolatileCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries.lock().await.put(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.pop(key);
        Ok(())
    }
}

pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    postcard::to_allocvec(value).map_err(|e| CacheError::Codec(e.to_string()))
}

pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    postcard::from_bytes(bytes).map_err(|e| CacheError::Codec(e.to_string()))
}

/// Read and decode a cached value. Failures and undecodable entries are misses.
pub async fn cache_get<T: DeserializeOwned>(cache: &dyn VolatileCache, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(bytes)) => match decode_value(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Dropping undecodable cache entry {}: {}", key, e);
                let _ = cache.delete(key).await;
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("Cache read for {} failed: {}", key, e);
            None
        }
    }
}

/// Encode and store a value, logging failures.
pub async fn cache_set<T: Serialize>(cache: &dyn VolatileCache, key: &str, value: &T) {
    let result = match encode_value(value) {
        Ok(bytes) => cache.set(key, bytes).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::debug!("Cache write for {} failed: {}", key, e);
    }
}

/// Delete a cache entry, logging failures.
pub async fn cache_delete(cache: &dyn VolatileCache, key: &str) {
    if let Err(e) = cache.delete(key).await {
        tracing::debug!("Cache delete for {} failed: {}", key, e);
    }
}

/// Cache key of a memoized value: `cc:<namespace>:<id>`.
pub fn memo_key(namespace: &str, id: &str) -> String {
    format!("cc:{}:{}", namespace, id)
}

/// Drop the memoized value of `id`, forcing recomputation on the next read.
pub async fn invalidate_memo(cache: &dyn VolatileCache, namespace: &str, id: &str) {
    cache_delete(cache, &memo_key(namespace, id)).await;
}

type ComputeFn<T> = Arc<dyn Fn(String) -> BoxFuture<'static, crate::Result<T>> + Send + Sync>;
type SharedCompute<T> = Shared<BoxFuture<'static, Result<T, String>>>;

/// A running computation; `seq` tells a replaced flight from its successor.
struct Flight<T: Clone> {
    seq: u64,
    future: SharedCompute<T>,
}

struct Flights<T: Clone> {
    next_seq: u64,
    by_id: HashMap<String, Flight<T>>,
}

/// A named computation whose results are cached per id.
///
/// Concurrent misses on the same id share one computation. Failed
/// computations are returned to every waiter and never cached. A
/// computation started before [`MemoizedCompute::invalidate`] is detached:
/// later reads start a new one and its result is never cached.
pub struct MemoizedCompute<T>
where
    T: Clone + Send + Sync + 'static,
{
    namespace: String,
    cache: Arc<dyn VolatileCache>,
    compute: ComputeFn<T>,
    flights: Mutex<Flights<T>>,
}

impl<T> MemoizedCompute<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new<F>(namespace: impl Into<String>, cache: Arc<dyn VolatileCache>, compute: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, crate::Result<T>> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            cache,
            compute: Arc::new(compute),
            flights: Mutex::new(Flights {
                next_seq: 0,
                by_id: HashMap::new(),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Return the cached value for `id`, computing and caching it on a miss.
    pub async fn get(&self, id: &str) -> crate::Result<T> {
        let key = memo_key(&self.namespace, id);
        if let Some(value) = cache_get::<T>(self.cache.as_ref(), &key).await {
            tracing::trace!("Memo hit for {}", key);
            return Ok(value);
        }

        let (seq, shared) = {
            let mut flights = self.flights.lock().await;
            if let Some(flight) = flights.by_id.get(id) {
                (flight.seq, flight.future.clone())
            } else {
                let compute = Arc::clone(&self.compute);
                let owned_id = id.to_string();
                let future: BoxFuture<'static, Result<T, String>> = Box::pin(async move {
                    compute(owned_id).await.map_err(|e| format!("{:#}", e))
                });
                let shared = future.shared();
                let seq = flights.next_seq;
                flights.next_seq += 1;
                flights.by_id.insert(
                    id.to_string(),
                    Flight {
                        seq,
                        future: shared.clone(),
                    },
                );
                (seq, shared)
            }
        };

        let result = shared.await;

        // Only the live flight may retire itself and publish its value.
        let mut flights = self.flights.lock().await;
        let live = flights.by_id.get(id).is_some_and(|flight| flight.seq == seq);
        if live {
            flights.by_id.remove(id);
            if let Ok(value) = &result {
                cache_set(self.cache.as_ref(), &key, value).await;
            }
        }
        drop(flights);

        result.map_err(|message| anyhow::anyhow!(message))
    }

    /// Drop the cached value of `id` and detach any computation in flight.
    pub async fn invalidate(&self, id: &str) {
        let mut flights = self.flights.lock().await;
        if flights.by_id.remove(id).is_some() {
            tracing::trace!("Detached in-flight {} computation for {}", self.namespace, id);
        }
        invalidate_memo(self.cache.as_ref(), &self.namespace, id).await;
    }
}
