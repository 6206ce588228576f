//! One crawl cycle over both frontiers.
//!
//! Due entries of both frontiers are grouped by host. Host groups run
//! concurrently; inside a group fetches are sequential and spaced by the
//! request delay, so each host sees at most one request at a time.

use super::fetch::Fetcher;
use super::frontier::DueWork;
use super::pipeline::Pipeline;
use crate::config::CrawlConfig;
use crate::error::FetchError;
use crate::path::parse_person_id;
use crate::types::Frontier;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub packages: usize,
    pub authors: usize,
    /// Grouping passes over the frontiers
    pub passes: usize,
    /// The deadline hit or the cycle was cancelled before the frontiers drained
    pub interrupted: bool,
}

/// Crawls due frontier entries through a [`Fetcher`].
pub struct Crawler {
    pipeline: Arc<Pipeline>,
    fetcher: Arc<dyn Fetcher>,
    request_delay: Duration,
    deadline: Duration,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("request_delay", &self.request_delay)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    pub fn new(pipeline: Arc<Pipeline>, fetcher: Arc<dyn Fetcher>, config: &CrawlConfig) -> Self {
        Self {
            pipeline,
            fetcher,
            request_delay: config.request_delay(),
            deadline: config.cycle_deadline(),
        }
    }

    /// Fetch one package and ingest the result.
    ///
    /// Invalid packages are evicted. Other fetch failures reschedule the
    /// package with the normal backoff.
    pub async fn crawl_package(&self, path: &str) {
        let scheduler = self.pipeline.scheduler();
        match self.fetcher.fetch_package(path).await {
            Ok(package) => {
                if let Err(e) = self.pipeline.push_document(package).await {
                    tracing::error!("Ingesting {} failed: {:#}", path, e);
                }
            }
            Err(FetchError::Invalid(reason)) => {
                tracing::info!("Package {} is invalid: {}", path, reason);
                self.pipeline.report_invalid(path).await;
            }
            Err(e) => {
                tracing::warn!("Fetching {} failed: {}", path, e);
                if let Err(e) = scheduler.reschedule(Frontier::Package, path).await {
                    tracing::error!("Rescheduling {} failed: {}", path, e);
                }
            }
        }
    }

    /// Fetch the projects of one author and ingest them.
    pub async fn crawl_author(&self, id: &str) {
        let scheduler = self.pipeline.scheduler();
        let Some((site, username)) = parse_person_id(id) else {
            tracing::warn!("Dropping malformed author id {:?}", id);
            if let Err(e) = scheduler.evict(Frontier::Author, id).await {
                tracing::error!("Removing author {} failed: {}", id, e);
            }
            return;
        };

        match self.fetcher.fetch_author(site, username).await {
            Ok(projects) => {
                if let Err(e) = self.pipeline.push_author(site, username, &projects).await {
                    tracing::error!("Ingesting author {} failed: {:#}", id, e);
                }
            }
            Err(FetchError::Invalid(reason)) => {
                tracing::info!("Author {} is invalid: {}", id, reason);
                if let Err(e) = scheduler.evict(Frontier::Author, id).await {
                    tracing::error!("Removing author {} failed: {}", id, e);
                }
            }
            Err(e) => {
                tracing::warn!("Fetching author {} failed: {}", id, e);
                if let Err(e) = scheduler.reschedule(Frontier::Author, id).await {
                    tracing::error!("Rescheduling author {} failed: {}", id, e);
                }
            }
        }
    }

    /// Crawl the due items of one host in order until done, out of time or
    /// cancelled. `last` is when the previous fetch on this host finished.
    ///
    /// Returns how many items from the front were crawled and when the last
    /// fetch finished.
    async fn drain_host(
        &self,
        host: &str,
        items: &[(Frontier, String)],
        mut last: Option<Instant>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> (usize, Option<Instant>) {
        let mut crawled = 0;
        for (frontier, id) in items {
            if let Some(last) = last {
                if !self.request_delay.is_zero() {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep_until(last + self.request_delay) => {}
                    }
                }
            }
            if cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }

            match frontier {
                Frontier::Package => self.crawl_package(id).await,
                Frontier::Author => self.crawl_author(id).await,
            }
            crawled += 1;
            last = Some(Instant::now());
        }
        tracing::debug!("Crawled {} of {} entries on {}", crawled, items.len(), host);
        (crawled, last)
    }

    async fn due_work(&self, frontier: Frontier) -> DueWork {
        match self.pipeline.scheduler().group_due_work(frontier).await {
            Ok(work) => work,
            Err(e) => {
                tracing::error!("Listing due {} entries failed: {}", frontier, e);
                DueWork::default()
            }
        }
    }

    /// Crawl every due entry of both frontiers.
    ///
    /// Passes repeat while due entries not yet attempted in this cycle keep
    /// appearing (newly discovered packages, mostly). The request delay per
    /// host holds across passes. The current item always finishes; once the
    /// cycle deadline passes or `cancel` fires, no new item starts and the
    /// remainder stays due.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let deadline = Instant::now() + self.deadline;
        let mut report = CycleReport::default();
        let mut attempted: HashSet<(Frontier, String)> = HashSet::new();
        let mut last_fetch: HashMap<String, Instant> = HashMap::new();

        loop {
            let packages = self.due_work(Frontier::Package).await;
            let authors = self.due_work(Frontier::Author).await;

            let mut hosts: BTreeMap<String, Vec<(Frontier, String)>> = BTreeMap::new();
            for (frontier, work) in [(Frontier::Package, packages), (Frontier::Author, authors)] {
                for (host, ids) in work.groups {
                    let fresh = ids
                        .into_iter()
                        .map(|id| (frontier, id))
                        .filter(|item| !attempted.contains(item));
                    hosts.entry(host).or_default().extend(fresh);
                }
            }
            hosts.retain(|_, items| !items.is_empty());
            if hosts.is_empty() {
                break;
            }
            if cancel.is_cancelled() || Instant::now() >= deadline {
                report.interrupted = true;
                break;
            }
            report.passes += 1;

            let drained = join_all(hosts.iter().map(|(host, items)| {
                let last = last_fetch.get(host).copied();
                self.drain_host(host, items, last, deadline, cancel)
            }))
            .await;

            for ((host, items), (count, last)) in hosts.into_iter().zip(drained) {
                if let Some(last) = last {
                    last_fetch.insert(host, last);
                }
                for item in items.into_iter().take(count) {
                    match item.0 {
                        Frontier::Package => report.packages += 1,
                        Frontier::Author => report.authors += 1,
                    }
                    attempted.insert(item);
                }
            }

            if cancel.is_cancelled() || Instant::now() >= deadline {
                report.interrupted = true;
                break;
            }
        }

        tracing::info!(
            "Crawl cycle done: {} packages, {} authors in {} passes{}",
            report.packages,
            report.authors,
            report.passes,
            if report.interrupted { " (interrupted)" } else { "" }
        );
        report
    }
}
