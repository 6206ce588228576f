//! Persistent store interface and the typed helpers built on it.
//!
//! The store is an external collaborator: core code only sees the [`Store`]
//! trait. Records are JSON objects; [`record`] converts them to and from the
//! crate's record types, filling defaults for fields that no longer decode.

pub(crate) mod cached;
pub(crate) mod memory;
pub(crate) mod record;

pub use cached::CachedStore;
pub use memory::MemoryStore;
pub use record::{Table, decode_lenient};

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

/// Maximum number of ids handed to one batched backend read.
pub const MAX_BATCH: usize = 200;

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Gt,
}

/// One `field <op> value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Condition {
    /// Evaluate against a record. Missing or incomparable fields never match.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        match (self.op, compare_values(actual, &self.value)) {
            (Op::Eq, Some(Ordering::Equal))
            | (Op::Lt, Some(Ordering::Less))
            | (Op::Gt, Some(Ordering::Greater)) => true,
            _ => false,
        }
    }
}

/// Conjunction of conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Op::Eq, value.into())
    }

    #[must_use]
    pub fn where_lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Op::Lt, value.into())
    }

    #[must_use]
    pub fn where_gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, Op::Gt, value.into())
    }

    fn with(mut self, field: &str, op: Op, value: Value) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Sort order of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

/// Range query over one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    /// Return keys only; rows carry no record
    pub keys_only: bool,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn order_by(mut self, field: &str) -> Self {
        self.order = Some(Order {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }
}

/// One query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: String,
    pub record: Option<Value>,
}

/// Durable key-value store with filtered range queries.
///
/// `get` reports absence as [`StoreError::NotFound`]; a record that no longer
/// fits the reader's schema may come back as [`StoreError::SchemaMismatch`].
/// Deleting an absent key succeeds.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError>;

    /// Distinct values of `field` across the collection, sorted.
    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>, StoreError>;

    /// Names of the collections holding at least one record.
    async fn collections(&self) -> Result<Vec<String>, StoreError>;

    /// Batched read, one result per id in order.
    async fn get_many(&self, collection: &str, ids: &[String]) -> Vec<Result<Value, StoreError>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.get(collection, id).await);
        }
        results
    }

    async fn delete_many(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        for id in ids {
            self.delete(collection, id).await?;
        }
        Ok(())
    }
}

/// Order two JSON scalars of the same kind. Mixed kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use serde_json::json;

    #[test]
    fn filter_conditions_are_conjunctive() {
        let record = json!({"host": "github.com", "due_time": 100});
        check!(Filter::new().matches(&record));
        check!(Filter::new().where_eq("host", "github.com").where_lt("due_time", 200).matches(&record));
        check!(!Filter::new().where_eq("host", "github.com").where_lt("due_time", 50).matches(&record));
        check!(!Filter::new().where_gt("due_time", 100).matches(&record));
    }

    #[test]
    fn missing_and_mismatched_fields_never_match() {
        let record = json!({"host": "github.com"});
        check!(!Filter::new().where_eq("token", "x").matches(&record));
        check!(!Filter::new().where_lt("host", 5).matches(&record));
    }
}
