//! Error handling types and utilities.

use serde_json::Value;
use thiserror::Error;

/// A specialized Result type for pkgsearch operations.
///
/// This is an alias for `anyhow::Result` with context added via `.context()` and
/// `.with_context()` methods throughout the codebase.
pub type Result<T> = anyhow::Result<T>;

/// Error returned by a [`Store`](crate::store::Store) backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No record is stored under the requested key.
    #[error("no record '{id}' in {collection}")]
    NotFound { collection: String, id: String },

    /// The stored record does not fit the current schema.
    ///
    /// `partial` holds the record with unusable fields replaced by their
    /// defaults. Callers treat this as a successful read.
    #[error("schema mismatch for '{id}' in {collection}")]
    SchemaMismatch {
        collection: String,
        id: String,
        partial: Value,
    },

    /// Backend failure (I/O, lost connection, ...). Always propagated.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A record could not be encoded for storage.
    #[error("record encoding failed: {0}")]
    Codec(String),
}

impl StoreError {
    /// Create a backend error.
    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::Backend(message.to_string())
    }

    /// True for errors that still carry usable data or mean plain absence.
    pub const fn is_tolerated(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::SchemaMismatch { .. })
    }
}

/// Error returned by a [`VolatileCache`](crate::cache::VolatileCache).
///
/// The cache is best-effort; these errors are logged and swallowed by every
/// caller in this crate.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache value could not be encoded: {0}")]
    Codec(String),
}

/// Error returned by a [`Fetcher`](crate::crawl::Fetcher).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The package or author does not exist (or its path is malformed).
    /// The entry is evicted.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Any other failure. The entry is rescheduled with the normal backoff.
    #[error("fetch failed: {0}")]
    Transient(String),
}

impl FetchError {
    /// Create a transient fetch error.
    pub fn transient(message: impl std::fmt::Display) -> Self {
        Self::Transient(message.to_string())
    }
}
