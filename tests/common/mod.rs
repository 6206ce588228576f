//! Shared test fixtures and utilities for integration tests.
//!
//! # Test Isolation Strategy
//!
//! Every test builds its own [`Engine`] over a fresh in-memory store and
//! cache, so tests never share frontier or index state.
//!
//! # Available Fixtures
//!
//! - `engine`: an engine without a fetcher, for push-driven tests
//! - `crawling_engine`: an engine crawling through a [`FakeFetcher`]
//! - `crawling_engine_with`: the same with a request delay and cycle deadline
//!
//! [`FlakyStore`] wraps the in-memory store and fails selected operations,
//! for the degraded and failing search paths.

#![allow(dead_code)] // Helpers used across different integration test crates

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pkgsearch::error::{FetchError, StoreError};
use pkgsearch::store::{Filter, Query, Row};
use pkgsearch::{
    Config, Engine, FetchedPackage, Fetcher, Frontier, MemoryCache, MemoryStore, Store,
    VolatileCache,
};
use rstest::fixture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Configuration with no delay between fetches.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.crawl.request_delay_ms = 0;
    config
}

pub fn engine_over(store: Arc<dyn Store>) -> Engine {
    let cache: Arc<dyn VolatileCache> = Arc::new(MemoryCache::new(1024));
    Engine::new(store, cache, test_config())
}

#[fixture]
pub fn engine() -> Engine {
    engine_over(Arc::new(MemoryStore::new()))
}

/// An engine crawling through `fetcher`.
pub fn crawling_engine(fetcher: Arc<FakeFetcher>) -> Engine {
    engine_over(Arc::new(MemoryStore::new())).with_fetcher(fetcher)
}

/// An engine crawling through `fetcher` with the given request delay and
/// cycle deadline.
pub fn crawling_engine_with(fetcher: Arc<FakeFetcher>, delay_ms: u64, deadline_secs: u64) -> Engine {
    let mut config = test_config();
    config.crawl.request_delay_ms = delay_ms;
    config.crawl.cycle_deadline_secs = deadline_secs;
    let cache: Arc<dyn VolatileCache> = Arc::new(MemoryCache::new(1024));
    Engine::new(Arc::new(MemoryStore::new()), cache, config).with_fetcher(fetcher)
}

/// Minimal fetched metadata with unknown stars.
pub fn package(path: &str, imports: &[&str]) -> FetchedPackage {
    FetchedPackage {
        import_path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or_default().to_string(),
        synopsis: format!("Package {} does things.", path.rsplit('/').next().unwrap_or_default()),
        imports: imports.iter().map(ToString::to_string).collect(),
        star_count: -1,
        ..FetchedPackage::default()
    }
}

/// Push `package` and index it right away.
pub async fn ingest(engine: &Engine, package: FetchedPackage) {
    engine.push_document(package).await.expect("push succeeds");
    engine.process_pending().await.expect("indexing succeeds");
}

/// Move `id` into the past so the next due query sees it.
pub async fn make_due(engine: &Engine, frontier: Frontier, id: &str) {
    engine
        .scheduler()
        .schedule(frontier, id, Utc::now() - Duration::seconds(1))
        .await
        .expect("schedule succeeds");
}

/// Fetcher answering from fixed tables and recording every call.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    packages: Mutex<HashMap<String, Result<FetchedPackage, FetchError>>>,
    authors: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_package(&self, package: FetchedPackage) {
        let path = package.import_path.clone();
        self.packages.lock().unwrap().insert(path, Ok(package));
    }

    pub fn fail_package(&self, path: &str, error: FetchError) {
        self.packages.lock().unwrap().insert(path.to_string(), Err(error));
    }

    pub fn add_author(&self, site: &str, username: &str, projects: &[&str]) {
        self.authors.lock().unwrap().insert(
            format!("{}:{}", site, username),
            projects.iter().map(ToString::to_string).collect(),
        );
    }

    /// Ids fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Ids fetched so far with the time each fetch started.
    pub fn timed_calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, id: &str) {
        self.calls.lock().unwrap().push((id.to_string(), Instant::now()));
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_package(&self, import_path: &str) -> Result<FetchedPackage, FetchError> {
        self.record(import_path);
        self.packages
            .lock()
            .unwrap()
            .get(import_path)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Invalid(format!("{} not found", import_path))))
    }

    async fn fetch_author(&self, site: &str, username: &str) -> Result<Vec<String>, FetchError> {
        let id = format!("{}:{}", site, username);
        self.record(&id);
        self.authors
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| FetchError::transient("author lookup timed out"))
    }
}

/// In-memory store that fails selected operations on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_gets: Mutex<HashSet<String>>,
    fail_queries: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `get` of `id` fail with a backend error.
    pub fn fail_get(&self, id: &str) {
        self.failing_gets.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn put(&self, collection: &str, id: &str, record: Value) -> Result<(), StoreError> {
        self.inner.put(collection, id, record).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        if self.failing_gets.lock().unwrap().contains(id) {
            return Err(StoreError::backend(format!("injected failure for {}", id)));
        }
        self.inner.get(collection, id).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected query failure"));
        }
        self.inner.query(collection, query).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected count failure"));
        }
        self.inner.count(collection, filter).await
    }

    async fn distinct(&self, collection: &str, field: &str) -> Result<Vec<Value>, StoreError> {
        self.inner.distinct(collection, field).await
    }

    async fn collections(&self) -> Result<Vec<String>, StoreError> {
        self.inner.collections().await
    }
}
