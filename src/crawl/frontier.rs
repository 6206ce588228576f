//! Package and author frontiers.
//!
//! Every frontier entry carries the time it is next due and the host it will
//! be fetched from. The [`Scheduler`] owns discovery (enqueue), rescheduling
//! with jittered backoff, due-work grouping per host and frontier statistics.

use crate::cache::{MemoizedCompute, VolatileCache, cache_delete, cache_get, cache_set};
use crate::config::Config;
use crate::error::StoreError;
use crate::path::{is_valid_remote_path, parse_person_id, person_id};
use crate::store::{CachedStore, Filter, Query, Store, decode_lenient};
use crate::types::{CrawlEntry, Frontier};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Memo namespace of per-host entry totals.
pub const HOST_TOTALS: &str = "host-all";

/// Host id standing for every host of a frontier.
pub const ALL_HOSTS: &str = "<all>";

/// Due entries of one frontier, partitioned by host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueWork {
    /// Ids per host, each list ordered by due time
    pub groups: BTreeMap<String, Vec<String>>,
    /// The most overdue entry
    pub oldest: Option<(String, DateTime<Utc>)>,
}

impl DueWork {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of due ids across all hosts.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub host: String,
    pub total: i64,
    pub due: i64,
}

/// Entry counts of one frontier. Counts that could not be read are `-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierStats {
    pub total: i64,
    pub due: i64,
    pub hosts: Vec<HostStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlerStats {
    pub packages: FrontierStats,
    pub authors: FrontierStats,
    /// Time taken to gather the numbers
    pub elapsed: std::time::Duration,
}

impl fmt::Display for CrawlerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, stats) in [("Packages", &self.packages), ("Authors", &self.authors)] {
            writeln!(f, "{}: {} total, {} due", label, stats.total, stats.due)?;
            for host in &stats.hosts {
                writeln!(f, "  {}: {} total, {} due", host.host, host.total, host.due)?;
            }
        }
        write!(f, "Computed in {:?}", self.elapsed)
    }
}

/// Next due time after a fetch: `now + age` jittered by `[-age/5, +age/10]`.
pub fn jittered_due(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    let age_ms = age.num_milliseconds();
    let jitter = if age_ms > 0 {
        rand::thread_rng().gen_range(-(age_ms / 5)..=age_ms / 10)
    } else {
        0
    };
    now + age + Duration::milliseconds(jitter)
}

fn host_total_id(collection: &str, host: &str) -> String {
    format!("{}:{}", collection, host)
}

fn host_totals(store: Arc<dyn Store>, cache: Arc<dyn VolatileCache>) -> MemoizedCompute<i64> {
    MemoizedCompute::new(HOST_TOTALS, cache, move |id: String| {
        let store = Arc::clone(&store);
        Box::pin(async move {
            let (collection, host) = id
                .split_once(':')
                .with_context(|| format!("Malformed host total id '{}'", id))?;
            let filter = if host == ALL_HOSTS {
                Filter::new()
            } else {
                Filter::new().where_eq(CrawlEntry::HOST_FIELD, host)
            };
            let count = store
                .count(collection, &filter)
                .await
                .with_context(|| format!("Failed to count {}", id))?;
            Ok(count as i64)
        }) as BoxFuture<'static, crate::Result<i64>>
    })
}

fn due_filter(now: DateTime<Utc>) -> Filter {
    Filter::new().where_lt(CrawlEntry::DUE_TIME_FIELD, now.timestamp_millis())
}

/// Scheduling state of both crawl frontiers.
pub struct Scheduler {
    store: Arc<dyn Store>,
    cache: Arc<dyn VolatileCache>,
    packages: CachedStore<CrawlEntry>,
    authors: CachedStore<CrawlEntry>,
    totals: MemoizedCompute<i64>,
    package_age: Duration,
    author_age: Duration,
    due_cache_size: usize,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("package_age", &self.package_age)
            .field("author_age", &self.author_age)
            .field("due_cache_size", &self.due_cache_size)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn VolatileCache>, config: &Config) -> Self {
        Self {
            packages: CachedStore::new(
                Arc::clone(&store),
                Arc::clone(&cache),
                Frontier::Package.collection(),
            ),
            authors: CachedStore::new(
                Arc::clone(&store),
                Arc::clone(&cache),
                Frontier::Author.collection(),
            ),
            totals: host_totals(Arc::clone(&store), Arc::clone(&cache)),
            store,
            cache,
            package_age: config.crawl.package_age(),
            author_age: config.crawl.author_age(),
            due_cache_size: config.cache.list_due_cache,
        }
    }

    const fn entries(&self, frontier: Frontier) -> &CachedStore<CrawlEntry> {
        match frontier {
            Frontier::Package => &self.packages,
            Frontier::Author => &self.authors,
        }
    }

    const fn age(&self, frontier: Frontier) -> Duration {
        match frontier {
            Frontier::Package => self.package_age,
            Frontier::Author => self.author_age,
        }
    }

    /// The frontier entry of `id`, if scheduled.
    pub async fn find(&self, frontier: Frontier, id: &str) -> Result<Option<CrawlEntry>, StoreError> {
        self.entries(frontier).get(id).await
    }

    /// Drop the cached host totals a new entry would change.
    async fn invalidate_totals(&self, frontier: Frontier, host: &str) {
        let collection = frontier.collection();
        self.totals.invalidate(&host_total_id(collection, host)).await;
        self.totals.invalidate(&host_total_id(collection, ALL_HOSTS)).await;
    }

    /// Set the due time of `id`, creating the entry if needed.
    pub async fn schedule(
        &self,
        frontier: Frontier,
        id: &str,
        due_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let host = frontier.host_of(id);
        let may_be_new = match self.entries(frontier).get(id).await {
            Ok(existing) => existing.is_none(),
            Err(e) => {
                tracing::debug!("Reading {} entry {} failed: {}", frontier, id, e);
                true
            }
        };

        self.entries(frontier)
            .put(id, &CrawlEntry::new(due_time, host.as_str()))
            .await?;

        if may_be_new {
            self.invalidate_totals(frontier, &host).await;
        }
        Ok(())
    }

    /// Schedule the next crawl of `id` one jittered age from now.
    pub async fn reschedule(&self, frontier: Frontier, id: &str) -> Result<DateTime<Utc>, StoreError> {
        let due_time = jittered_due(Utc::now(), self.age(frontier));
        self.schedule(frontier, id, due_time).await?;
        tracing::debug!("Rescheduled {} {} for {}", frontier, id, due_time);
        Ok(due_time)
    }

    /// Add `id` to the frontier, due now, unless it is already scheduled.
    ///
    /// Returns whether a new entry was created. A failed read counts as
    /// "already scheduled".
    pub async fn enqueue(&self, frontier: Frontier, id: &str) -> bool {
        match self.entries(frontier).get(id).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Could not check {} entry {}: {}", frontier, id, e);
                return false;
            }
        }

        match self.schedule(frontier, id, Utc::now()).await {
            Ok(()) => {
                tracing::debug!("Enqueued {} {}", frontier, id);
                true
            }
            Err(e) => {
                tracing::warn!("Could not enqueue {} {}: {}", frontier, id, e);
                false
            }
        }
    }

    /// Discover a package. Invalid paths are ignored.
    pub async fn enqueue_package(&self, path: &str) -> bool {
        if !is_valid_remote_path(path) {
            tracing::trace!("Ignoring invalid package path {:?}", path);
            return false;
        }
        self.enqueue(Frontier::Package, path).await
    }

    /// Discover an author identity.
    pub async fn enqueue_author(&self, site: &str, username: &str) -> bool {
        let id = person_id(site, username);
        if parse_person_id(&id).is_none() {
            return false;
        }
        self.enqueue(Frontier::Author, &id).await
    }

    /// Remove `id` from the frontier.
    pub async fn evict(&self, frontier: Frontier, id: &str) -> Result<(), StoreError> {
        self.entries(frontier).delete(id).await?;
        self.invalidate_totals(frontier, &frontier.host_of(id)).await;
        Ok(())
    }

    /// Request an early crawl of a package.
    ///
    /// Returns `true` when the package is already due, so the caller may crawl
    /// it right away. Otherwise the package is made due now (created if
    /// missing) and `false` is returned. Invalid paths are ignored.
    pub async fn touch(&self, path: &str) -> bool {
        if !is_valid_remote_path(path) {
            tracing::trace!("Ignoring touch of invalid package path {:?}", path);
            return false;
        }
        let now = Utc::now();
        match self.packages.get(path).await {
            Ok(Some(entry)) if entry.is_due(now) => return true,
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not read package entry {}: {}", path, e),
        }

        if let Err(e) = self.schedule(Frontier::Package, path, now).await {
            tracing::warn!("Could not touch {}: {}", path, e);
        }
        false
    }

    /// Due entries of `frontier` grouped by host, each group in due order.
    pub async fn group_due_work(&self, frontier: Frontier) -> Result<DueWork, StoreError> {
        let now = Utc::now();
        let query = Query::new(due_filter(now)).order_by(CrawlEntry::DUE_TIME_FIELD);
        let rows = self.store.query(frontier.collection(), &query).await?;

        let mut work = DueWork::default();
        for row in rows {
            let entry: CrawlEntry = row.record.as_ref().map(decode_lenient).unwrap_or_default();
            let host = if entry.host.is_empty() {
                frontier.host_of(&row.key)
            } else {
                entry.host
            };
            if work.oldest.is_none() {
                work.oldest = Some((row.key.clone(), entry.due_time));
            }
            work.groups.entry(host).or_default().push(row.key);
        }

        if let Some((id, due)) = &work.oldest {
            tracing::debug!(
                "{} {} entries due on {} hosts, oldest {} since {}",
                work.len(),
                frontier,
                work.groups.len(),
                id,
                due
            );
        }
        Ok(work)
    }

    async fn query_due(&self, frontier: Frontier, limit: Option<usize>) -> Result<Vec<String>, StoreError> {
        let mut query = Query::new(due_filter(Utc::now()))
            .order_by(CrawlEntry::DUE_TIME_FIELD)
            .keys_only();
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let rows = self.store.query(frontier.collection(), &query).await?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    /// Up to `limit` due ids of `frontier`, most overdue first.
    ///
    /// Small limits are served from a cached list of due ids; served ids leave
    /// the list so concurrent callers get disjoint work. A negative limit
    /// means no limit and, like limits at or above the cached list size,
    /// bypasses the cache.
    pub async fn list_due(&self, frontier: Frontier, limit: i64) -> Result<Vec<String>, StoreError> {
        let size = self.due_cache_size;
        let Ok(limit) = usize::try_from(limit) else {
            return self.query_due(frontier, None).await;
        };
        if limit >= size {
            return self.query_due(frontier, Some(limit)).await;
        }

        let key = format!("tc:{}", frontier.collection());
        let mut ids: Vec<String> = cache_get(self.cache.as_ref(), &key).await.unwrap_or_default();
        if ids.len() < limit {
            ids = self.query_due(frontier, Some(size)).await?;
        }

        let rest = ids.split_off(limit.min(ids.len()));
        if rest.is_empty() {
            cache_delete(self.cache.as_ref(), &key).await;
        } else {
            cache_set(self.cache.as_ref(), &key, &rest).await;
        }
        Ok(ids)
    }

    async fn host_total(&self, collection: &str, host: &str) -> i64 {
        match self.totals.get(&host_total_id(collection, host)).await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!("Host total of {} in {} failed: {:#}", host, collection, e);
                -1
            }
        }
    }

    async fn count_or_negative(&self, collection: &str, filter: &Filter) -> i64 {
        match self.store.count(collection, filter).await {
            Ok(count) => count as i64,
            Err(e) => {
                tracing::warn!("Counting {} failed: {}", collection, e);
                -1
            }
        }
    }

    async fn frontier_stats(&self, frontier: Frontier) -> FrontierStats {
        let collection = frontier.collection();
        let now = Utc::now();

        let mut stats = FrontierStats {
            total: self.host_total(collection, ALL_HOSTS).await,
            due: self.count_or_negative(collection, &due_filter(now)).await,
            hosts: Vec::new(),
        };

        let hosts = match self.store.distinct(collection, CrawlEntry::HOST_FIELD).await {
            Ok(hosts) => hosts,
            Err(e) => {
                tracing::warn!("Listing hosts of {} failed: {}", collection, e);
                return stats;
            }
        };

        for host in hosts.iter().filter_map(|h| h.as_str()) {
            let due = due_filter(now).where_eq(CrawlEntry::HOST_FIELD, host);
            stats.hosts.push(HostStats {
                host: host.to_string(),
                total: self.host_total(collection, host).await,
                due: self.count_or_negative(collection, &due).await,
            });
        }
        stats
    }

    /// Entry counts of both frontiers, in total and per host.
    pub async fn stats(&self) -> CrawlerStats {
        let started = Instant::now();
        let packages = self.frontier_stats(Frontier::Package).await;
        let authors = self.frontier_stats(Frontier::Author).await;
        CrawlerStats {
            packages,
            authors,
            elapsed: started.elapsed(),
        }
    }
}
