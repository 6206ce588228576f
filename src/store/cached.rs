//! Read-through cache in front of one store collection.

use super::record::{Record, accept, encode};
use super::{MAX_BATCH, Store};
use crate::cache::{VolatileCache, cache_delete, cache_get, cache_set};
use crate::error::StoreError;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed collection access that consults the volatile cache first.
///
/// Cache keys are `doc:<collection>:<id>`. Cache failures are logged and
/// ignored; store failures propagate.
pub struct CachedStore<T> {
    store: Arc<dyn Store>,
    cache: Arc<dyn VolatileCache>,
    collection: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CachedStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            collection: self.collection.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> CachedStore<T> {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn VolatileCache>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            collection: collection.into(),
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn cache_key(&self, id: &str) -> String {
        format!("doc:{}:{}", self.collection, id)
    }

    async fn remember(&self, id: &str, record: &T) {
        cache_set(self.cache.as_ref(), &self.cache_key(id), record).await;
    }

    async fn recall(&self, id: &str) -> Option<T> {
        cache_get(self.cache.as_ref(), &self.cache_key(id)).await
    }

    /// Read a record, populating the cache on a store hit.
    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        if let Some(record) = self.recall(id).await {
            return Ok(Some(record));
        }

        let result = self.store.get(&self.collection, id).await;
        let record = accept::<T>(&self.collection, id, result)?;
        if let Some(record) = &record {
            self.remember(id, record).await;
        }
        Ok(record)
    }

    /// Write to the store, then refresh the cache.
    pub async fn put(&self, id: &str, record: &T) -> Result<(), StoreError> {
        self.store.put(&self.collection, id, encode(record)?).await?;
        self.remember(id, record).await;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        cache_delete(self.cache.as_ref(), &self.cache_key(id)).await;
        self.store.delete(&self.collection, id).await
    }

    /// Read many records. Ids that are absent or fail to load are omitted.
    ///
    /// Cache hits are served first; the rest go to the store in batches of
    /// at most [`MAX_BATCH`] ids and are cached on return.
    pub async fn get_many(&self, ids: &[String]) -> HashMap<String, T> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            if found.contains_key(id) {
                continue;
            }
            match self.recall(id).await {
                Some(record) => {
                    found.insert(id.clone(), record);
                }
                None => missing.push(id.clone()),
            }
        }
        missing.dedup();

        for chunk in missing.chunks(MAX_BATCH) {
            let results = self.store.get_many(&self.collection, chunk).await;
            for (id, result) in chunk.iter().zip(results) {
                match accept::<T>(&self.collection, id, result) {
                    Ok(Some(record)) => {
                        self.remember(id, &record).await;
                        found.insert(id.clone(), record);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Skipping {} in {}: {}", id, self.collection, e),
                }
            }
        }

        found
    }
}
