//! Package crawl scheduling, inverted indexing and ranked search over
//! package metadata.

pub mod cache;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod engine;
pub mod error;
pub mod path;
pub mod search;
pub mod server;
pub mod store;
pub mod tools;
pub mod tracing;
pub mod types;
pub mod worker;

pub use cache::{MemoizedCompute, MemoryCache, VolatileCache};
pub use config::Config;
pub use crawl::{Crawler, FetchedPackage, Fetcher, Pipeline, Scheduler};
pub use engine::{Engine, PackageView, SearchResult};
pub use error::{CacheError, FetchError, Result, StoreError};
pub use server::SearchServer;
pub use store::{CachedStore, MemoryStore, Store};
pub use types::{CrawlEntry, Document, Frontier};
pub use worker::{CrawlSupervisor, CrawlWorker};
