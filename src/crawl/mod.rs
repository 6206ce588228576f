//! Crawl scheduling and the document pipeline.
//!
//! - [`Scheduler`]: the package and author frontiers
//! - [`Pipeline`]: ingest of fetched metadata, indexing and eviction
//! - [`Crawler`]: host-grouped crawl cycles through a [`Fetcher`]

pub(crate) mod cycle;
pub(crate) mod fetch;
pub(crate) mod frontier;
pub(crate) mod pipeline;

pub use cycle::{Crawler, CycleReport};
pub use fetch::{FetchedPackage, Fetcher};
pub use frontier::{
    ALL_HOSTS, CrawlerStats, DueWork, FrontierStats, HOST_TOTALS, HostStats, Scheduler,
    jittered_due,
};
pub use pipeline::{Pipeline, diff_ids};
