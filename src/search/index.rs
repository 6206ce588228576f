//! Store-backed inverted index.
//!
//! Each field lives in its own collection (`<prefix><field>`) holding one
//! [`IndexEntry`] per (token, id) membership.

use super::tokenize::Tokens;
use crate::error::StoreError;
use crate::store::record::encode;
use crate::store::{Filter, Query, Store, decode_lenient};
use crate::types::IndexEntry;
use ahash::AHashSet;
use std::sync::Arc;

/// Token → id-set mapping with conjunctive search.
#[derive(Clone)]
pub struct TokenSet {
    store: Arc<dyn Store>,
    prefix: String,
}

impl TokenSet {
    pub fn new(store: Arc<dyn Store>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn collection(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field)
    }

    /// Remove every membership of `id` under `field`.
    pub async fn delete(&self, field: &str, id: &str) -> Result<(), StoreError> {
        let collection = self.collection(field);
        let query = Query::new(Filter::new().where_eq(IndexEntry::ID_FIELD, id)).keys_only();
        let keys: Vec<String> = self
            .store
            .query(&collection, &query)
            .await?
            .into_iter()
            .map(|row| row.key)
            .collect();

        tracing::debug!("Deleting {} entries of {} in {}", keys.len(), id, collection);
        if !keys.is_empty() {
            self.store.delete_many(&collection, &keys).await?;
        }
        Ok(())
    }

    /// Replace the token set of `id` under `field`.
    ///
    /// Old memberships are removed before any new one is written, so readers
    /// never see a mix of old and new tokens.
    pub async fn index(&self, field: &str, id: &str, tokens: &Tokens) -> Result<(), StoreError> {
        self.delete(field, id).await?;

        let collection = self.collection(field);
        tracing::debug!("Adding {} tokens for {} in {}", tokens.len(), id, collection);
        for token in tokens {
            let entry = IndexEntry {
                token: token.clone(),
                id: id.to_string(),
            };
            self.store
                .put(&collection, &IndexEntry::key(token, id), encode(&entry)?)
                .await?;
        }
        Ok(())
    }

    async fn ids_for(&self, collection: &str, token: &str) -> Result<AHashSet<String>, StoreError> {
        let query = Query::new(Filter::new().where_eq(IndexEntry::TOKEN_FIELD, token));
        let rows = self.store.query(collection, &query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.record)
            .map(|record| decode_lenient::<IndexEntry>(&record).id)
            .filter(|id| !id.is_empty())
            .collect())
    }

    /// Ids indexed under every one of `tokens`, sorted.
    ///
    /// An empty token set matches nothing.
    pub async fn search(&self, field: &str, tokens: &Tokens) -> Result<Vec<String>, StoreError> {
        let collection = self.collection(field);
        let mut ordered: Vec<&String> = tokens.iter().collect();
        ordered.sort_unstable();

        let mut matched: Option<AHashSet<String>> = None;
        for token in ordered {
            let ids = self.ids_for(&collection, token).await?;
            tracing::trace!("{} entries for token {} in {}", ids.len(), token, collection);

            let next = match matched {
                None => ids,
                Some(previous) => previous.into_iter().filter(|id| ids.contains(id)).collect(),
            };
            if next.is_empty() {
                return Ok(Vec::new());
            }
            matched = Some(next);
        }

        let mut ids: Vec<String> = matched.unwrap_or_default().into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Number of ids [`TokenSet::search`] would return.
    pub async fn count(&self, field: &str, tokens: &Tokens) -> Result<usize, StoreError> {
        if let (1, Some(token)) = (tokens.len(), tokens.iter().next()) {
            return Ok(self.ids_for(&self.collection(field), token).await?.len());
        }
        Ok(self.search(field, tokens).await?.len())
    }
}
