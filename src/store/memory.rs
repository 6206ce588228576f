//! In-process [`Store`] with an optional JSON snapshot on disk.

use super::{Filter, Query, Row, Store, compare_values};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// Ordered in-memory collections of JSON records.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a snapshot written by [`MemoryStore::save`].
    /// A missing snapshot yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(StoreError::backend(e)),
        };

        let collections: Collections =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
        let records: usize = collections.values().map(BTreeMap::len).sum();
        tracing::info!("Loaded {} records from {}", records, path.display());

        Ok(Self {
            collections: RwLock::new(collections),
        })
    }

    /// Write every collection to `path`, replacing it atomically.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = {
            let collections = self.collections.read().await;
            serde_json::to_vec(&*collections).map_err(|e| StoreError::Codec(e.to_string()))?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::backend)?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(StoreError::backend)?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(StoreError::backend)?;

        tracing::debug!("Saved snapshot to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

fn order_rows(rows: &mut [(&String, &Value)], field: &str, descending: bool) {
    rows.sort_by(|(ka, a), (kb, b)| {
        let ord = match (a.get(field), b.get(field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ord = if descending { ord.reverse() } else { ord };
        ord.then_with(|| ka.cmp(kb))
    });
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(records) = collections.get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(&String, &Value)> = records
            .iter()
            .filter(|(_, record)| query.filter.matches(record))
            .collect();

        if let Some(order) = &query.order {
            order_rows(&mut matched, &order.field, order.descending);
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched
            .into_iter()
            .map(|(key, record)| Row {
                key: key.clone(),
                record: (!query.keys_only).then(|| record.clone()),
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |records| {
            records.values().filter(|r| filter.matches(r)).count()
        }))
    }

    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<Value> = records
            .values()
            .filter_map(|record| record.get(field).cloned())
            .collect();
        values.sort_by(|a, b| compare_values(a, b).unwrap_or(Ordering::Equal));
        values.dedup();
        Ok(values)
    }

    async fn collections(&self) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(records) = collections.get_mut(collection) {
            for id in ids {
                records.remove(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, due, host) in [("c", 30, "b.org"), ("a", 10, "a.org"), ("b", 20, "a.org")] {
            store
                .put("crawler", id, json!({"due_time": due, "host": host}))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = seeded().await;
        let query = Query::new(Filter::new().where_lt("due_time", 25))
            .order_by("due_time")
            .limit(5);
        let rows = store.query("crawler", &query).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        check!(keys == ["a", "b"]);
        check!(rows[0].record.is_some());

        let rows = store
            .query("crawler", &Query::new(Filter::new()).keys_only().limit(1))
            .await
            .unwrap();
        check!(rows.len() == 1);
        check!(rows[0].record.is_none());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = seeded().await;
        let_assert!(Err(StoreError::NotFound { .. }) = store.get("crawler", "zzz").await);
        let_assert!(Err(StoreError::NotFound { .. }) = store.get("nothing", "a").await);
        check!(store.delete("crawler", "zzz").await.is_ok());
    }

    #[tokio::test]
    async fn count_and_distinct() {
        let store = seeded().await;
        check!(store.count("crawler", &Filter::new()).await.unwrap() == 3);
        check!(
            store
                .count("crawler", &Filter::new().where_eq("host", "a.org"))
                .await
                .unwrap()
                == 2
        );
        let hosts = store.distinct("crawler", "host").await.unwrap();
        check!(hosts == vec![json!("a.org"), json!("b.org")]);
        check!(store.collections().await.unwrap() == vec!["crawler".to_string()]);
    }

    #[tokio::test]
    async fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");

        let store = seeded().await;
        store.save(&path).await.unwrap();

        let restored = MemoryStore::load(&path).await.unwrap();
        check!(restored.get("crawler", "b").await.unwrap() == json!({"due_time": 20, "host": "a.org"}));

        let empty = MemoryStore::load(&dir.path().join("absent.json")).await.unwrap();
        check!(empty.count("crawler", &Filter::new()).await.unwrap() == 0);
    }
}
