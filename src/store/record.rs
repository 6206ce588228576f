//! Typed record access with default-filling decode.

use super::{Filter, Query, Row, Store};
use crate::error::StoreError;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Bound shared by every persisted record type.
pub trait Record: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

/// Encode a record for the store.
pub fn encode<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Decode a stored record, keeping every field that still fits the schema.
///
/// Starts from `T::default()` and merges the stored fields one by one; a field
/// whose stored value breaks decoding keeps its default instead.
pub fn decode_lenient<T: Record>(value: &Value) -> T {
    let Value::Object(stored) = value else {
        return T::default();
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(T::default()) else {
        return T::default();
    };

    for (field, stored_value) in stored {
        let previous = merged.insert(field.clone(), stored_value.clone());
        if serde_json::from_value::<T>(Value::Object(merged.clone())).is_err() {
            match previous {
                Some(previous) => merged.insert(field.clone(), previous),
                None => merged.remove(field),
            };
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

/// Decode a record read from `collection`.
///
/// A record that only decodes leniently is reported as
/// [`StoreError::SchemaMismatch`] carrying the repaired record.
pub fn decode<T: Record>(collection: &str, id: &str, value: Value) -> Result<T, StoreError> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(record) => Ok(record),
        Err(e) => {
            tracing::debug!("Record '{}' in {} needs lenient decode: {}", id, collection, e);
            let repaired: T = decode_lenient(&value);
            Err(StoreError::SchemaMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                partial: encode(&repaired)?,
            })
        }
    }
}

/// Turn a raw read into `Some(record)`, `None` for absence, or an error.
///
/// Schema mismatches count as successful reads of the partial record.
pub fn accept<T: Record>(
    collection: &str,
    id: &str,
    result: Result<Value, StoreError>,
) -> Result<Option<T>, StoreError> {
    let value = match result {
        Ok(value) => value,
        Err(StoreError::NotFound { .. }) => return Ok(None),
        Err(StoreError::SchemaMismatch { partial, .. }) => partial,
        Err(e) => return Err(e),
    };

    match decode(collection, id, value) {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::SchemaMismatch { partial, .. }) => Ok(Some(decode_lenient(&partial))),
        Err(e) => Err(e),
    }
}

/// Uncached typed view over one collection.
pub struct Table<T> {
    store: Arc<dyn Store>,
    collection: String,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Table<T> {
    pub fn new(store: Arc<dyn Store>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Read a record. `Ok(None)` when absent.
    pub async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let result = self.store.get(&self.collection, id).await;
        accept(&self.collection, id, result)
    }

    pub async fn put(&self, id: &str, record: &T) -> Result<(), StoreError> {
        self.store.put(&self.collection, id, encode(record)?).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.collection, id).await
    }

    /// Write many records; returns one result per id.
    pub async fn put_many(&self, ids: &[String], record: &T) -> Vec<Result<(), StoreError>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.put(id, record).await);
        }
        results
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.store.query(&self.collection, query).await
    }

    /// Keys of every record matching `filter`.
    pub async fn keys(&self, filter: Filter) -> Result<Vec<String>, StoreError> {
        let rows = self.query(&Query::new(filter).keys_only()).await?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    pub async fn count(&self, filter: &Filter) -> Result<usize, StoreError> {
        self.store.count(&self.collection, filter).await
    }
}
