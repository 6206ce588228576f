//! Background crawl and indexing loop.
//!
//! [`CrawlSupervisor::start`] spawns the loop with a cancellation token it
//! keeps; [`CrawlSupervisor::stop`] cancels it and waits for the current step
//! to finish. Each round runs a crawl cycle (when a fetcher is configured),
//! then an indexing pass over fetched documents and a pass over the update
//! worklist, then sleeps until the next round.

use crate::config::Config;
use crate::crawl::{Crawler, Pipeline};
use crate::store::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// One round of background work, repeated on an interval.
pub struct CrawlWorker {
    crawler: Option<Arc<Crawler>>,
    pipeline: Arc<Pipeline>,
    interval: Duration,
    index_deadline: Duration,
    snapshot: Option<(Arc<MemoryStore>, PathBuf)>,
}

impl std::fmt::Debug for CrawlWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlWorker")
            .field("crawls", &self.crawler.is_some())
            .field("interval", &self.interval)
            .field("index_deadline", &self.index_deadline)
            .field("snapshot", &self.snapshot.as_ref().map(|(_, path)| path))
            .finish()
    }
}

impl CrawlWorker {
    /// Create a worker. Without a crawler only the indexing passes run.
    pub fn new(crawler: Option<Arc<Crawler>>, pipeline: Arc<Pipeline>, config: &Config) -> Self {
        Self {
            crawler,
            pipeline,
            interval: config.crawl.cycle_interval(),
            index_deadline: config.index.deadline(),
            snapshot: None,
        }
    }

    /// Save `store` to `path` after every round.
    #[must_use]
    pub fn with_snapshot(mut self, store: Arc<MemoryStore>, path: PathBuf) -> Self {
        self.snapshot = Some((store, path));
        self
    }

    /// Run one round: crawl, index fetched documents, refresh the worklist.
    pub async fn run_once(&self, cancel: &CancellationToken) {
        if let Some(crawler) = &self.crawler {
            crawler.run_cycle(cancel).await;
        }
        if cancel.is_cancelled() {
            return;
        }

        match self.pipeline.index_fetched(self.index_deadline).await {
            Ok(count) if count > 0 => tracing::info!("Indexed {} fetched documents", count),
            Ok(_) => {}
            Err(e) => tracing::error!("Indexing pass failed: {:#}", e),
        }
        match self.pipeline.process_to_update(self.index_deadline).await {
            Ok(count) if count > 0 => tracing::info!("Refreshed {} documents", count),
            Ok(_) => {}
            Err(e) => tracing::error!("Update pass failed: {:#}", e),
        }

        if let Some((store, path)) = &self.snapshot {
            if let Err(e) = store.save(path).await {
                tracing::error!("Saving snapshot to {} failed: {}", path.display(), e);
            }
        }
    }

    /// Run rounds until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_once(&cancel).await;
        }
        tracing::info!("Crawl worker stopped");
    }
}

/// Owner of the running background loop.
#[derive(Debug)]
pub struct CrawlSupervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CrawlSupervisor {
    /// Spawn `worker` as a tokio task.
    pub fn start(worker: CrawlWorker) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tracing::info!("Starting crawl worker: {:?}", worker);
        let handle = tokio::spawn(async move { worker.run(token).await });
        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!("Crawl worker ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, VolatileCache};
    use crate::crawl::{FetchedPackage, Scheduler};
    use crate::store::Store;
    use crate::types::Frontier;
    use assert2::{check, let_assert};

    #[tokio::test]
    async fn stop_ends_the_loop() {
        let config = Config::default();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn VolatileCache> = Arc::new(MemoryCache::new(64));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&store), Arc::clone(&cache), &config));
        let pipeline = Arc::new(Pipeline::new(store, cache, scheduler, &config.index));

        pipeline
            .push_document(FetchedPackage {
                import_path: "example.com/queued".to_string(),
                name: "queued".to_string(),
                ..FetchedPackage::default()
            })
            .await
            .unwrap();

        let supervisor = CrawlSupervisor::start(CrawlWorker::new(None, Arc::clone(&pipeline), &config));
        check!(supervisor.is_running());

        // The first tick fires immediately; wait for the round to index.
        for _ in 0..100 {
            if pipeline.docs().get("example.com/queued").await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        supervisor.stop().await;

        let_assert!(Ok(Some(doc)) = pipeline.docs().get("example.com/queued").await);
        check!(doc.name == "queued");
        let_assert!(Ok(Some(_)) = pipeline.scheduler().find(Frontier::Package, "example.com/queued").await);
    }
}
