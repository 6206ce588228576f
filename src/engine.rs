//! The search engine facade: search, document views, ingest and statistics
//! over one store and cache.

use crate::cache::VolatileCache;
use crate::config::Config;
use crate::crawl::{Crawler, CrawlerStats, FetchedPackage, Fetcher, Pipeline, Scheduler};
use crate::search::{RankedDoc, ResultPage, Tokens, present, rank, tokenize};
use crate::store::Store;
use crate::types::{Document, Frontier, collections};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Ranked hits of one query.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Loaded hits in final order
    pub docs: Vec<RankedDoc>,
    /// Normalized query tokens
    pub tokens: Tokens,
    /// Ids matched by the index, including any that failed to load
    pub total: usize,
}

/// What is known about one package id.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageView {
    Found(Box<Document>),
    /// Not indexed yet, due for a crawl at the given time
    Scheduled(DateTime<Utc>),
    NotScheduled,
}

impl fmt::Display for PackageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(doc) => {
                writeln!(f, "{} ({})", doc.name, doc.import_path)?;
                if !doc.synopsis.is_empty() {
                    writeln!(f, "{}", doc.synopsis)?;
                }
                writeln!(f, "author: {}", doc.author)?;
                if !doc.project_url.is_empty() {
                    writeln!(f, "project: {}", doc.project_url)?;
                }
                writeln!(
                    f,
                    "stars: {}, score: {:.3}, updated: {}",
                    doc.star_count.max(0),
                    doc.static_score,
                    doc.last_updated.format("%Y-%m-%d %H:%M:%S")
                )?;
                writeln!(f, "imports: {}", doc.declared_imports.len())?;
                for path in &doc.declared_imports {
                    writeln!(f, "  {}", path)?;
                }
                writeln!(f, "imported by: {}", doc.importers.len())?;
                for path in &doc.importers {
                    writeln!(f, "  {}", path)?;
                }
                if !doc.description.is_empty() {
                    writeln!(f)?;
                    writeln!(f, "{}", doc.description.trim())?;
                }
                Ok(())
            }
            Self::Scheduled(due) => write!(
                f,
                "Not found. Scheduled to be crawled at {}.",
                due.format("%Y-%m-%d %H:%M:%S")
            ),
            Self::NotScheduled => write!(f, "Not found. Not scheduled for crawling yet."),
        }
    }
}

/// Shared state behind every operation of the service.
pub struct Engine {
    config: Config,
    scheduler: Arc<Scheduler>,
    pipeline: Arc<Pipeline>,
    crawler: Option<Arc<Crawler>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("scheduler", &self.scheduler)
            .field("crawls", &self.crawler.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn VolatileCache>, config: Config) -> Self {
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&store), Arc::clone(&cache), &config));
        let pipeline = Arc::new(Pipeline::new(
            store,
            cache,
            Arc::clone(&scheduler),
            &config.index,
        ));
        Self {
            config,
            scheduler,
            pipeline,
            crawler: None,
        }
    }

    /// Crawl through `fetcher`.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.crawler = Some(Arc::new(Crawler::new(
            Arc::clone(&self.pipeline),
            fetcher,
            &self.config.crawl,
        )));
        self
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub const fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub const fn crawler(&self) -> Option<&Arc<Crawler>> {
        self.crawler.as_ref()
    }

    /// Find and rank the documents matching every token of `query`.
    ///
    /// Index failures fail the search. Documents that cannot be loaded are
    /// left out of the ranking.
    pub async fn search(&self, query: &str) -> crate::Result<SearchResult> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(SearchResult {
                tokens,
                ..SearchResult::default()
            });
        }

        let ids = self
            .pipeline
            .index()
            .search(collections::INDEX_FIELD, &tokens)
            .await
            .with_context(|| format!("Index lookup for {:?} failed", query))?;

        let mut loaded = self.pipeline.docs().get_many(&ids).await;
        let mut docs: Vec<RankedDoc> = ids
            .iter()
            .filter_map(|id| loaded.remove(id))
            .filter(|doc| !doc.import_path.is_empty())
            .map(|doc| RankedDoc::new(doc, &tokens))
            .collect();
        rank(&mut docs);

        tracing::info!(
            "Search {:?}: {} matches, {} loaded",
            query,
            ids.len(),
            docs.len()
        );
        Ok(SearchResult {
            docs,
            tokens,
            total: ids.len(),
        })
    }

    /// Search and present one page of folded, highlighted results.
    pub async fn search_page(&self, query: &str, page: usize) -> crate::Result<ResultPage> {
        let result = self.search(query).await?;
        Ok(present(
            &result.docs,
            result.total,
            &result.tokens,
            page,
            self.config.search.page_size,
            self.config.search.snippet_bytes,
        ))
    }

    /// Look up one package.
    pub async fn view(&self, id: &str) -> crate::Result<PackageView> {
        if let Some(doc) = self
            .pipeline
            .docs()
            .get(id)
            .await
            .with_context(|| format!("Failed to load {}", id))?
        {
            return Ok(PackageView::Found(Box::new(doc)));
        }

        let entry = self
            .scheduler
            .find(Frontier::Package, id)
            .await
            .with_context(|| format!("Failed to load the crawl entry of {}", id))?;
        Ok(match entry {
            Some(entry) => PackageView::Scheduled(entry.due_time),
            None => PackageView::NotScheduled,
        })
    }

    pub async fn push_document(&self, package: FetchedPackage) -> crate::Result<()> {
        self.pipeline.push_document(package).await
    }

    pub async fn push_author(
        &self,
        site: &str,
        username: &str,
        projects: &[String],
    ) -> crate::Result<bool> {
        self.pipeline.push_author(site, username, projects).await
    }

    pub async fn report_invalid(&self, id: &str) {
        self.pipeline.report_invalid(id).await;
    }

    pub async fn touch(&self, id: &str) -> bool {
        self.scheduler.touch(id).await
    }

    pub async fn append_packages(&self, paths: &[String]) -> usize {
        self.pipeline.append_packages(paths).await
    }

    pub async fn list_due(&self, frontier: Frontier, limit: i64) -> crate::Result<Vec<String>> {
        self.scheduler
            .list_due(frontier, limit)
            .await
            .with_context(|| format!("Failed to list due {} entries", frontier))
    }

    /// Run the indexing pass and the update pass once.
    ///
    /// Returns `(indexed, refreshed)`.
    pub async fn process_pending(&self) -> crate::Result<(usize, usize)> {
        let deadline = self.config.index.deadline();
        let indexed = self.pipeline.index_fetched(deadline).await?;
        let refreshed = self.pipeline.process_to_update(deadline).await?;
        Ok((indexed, refreshed))
    }

    pub async fn crawler_stats(&self) -> CrawlerStats {
        self.scheduler.stats().await
    }

    pub async fn database_stats(&self) -> Vec<(&'static str, i64)> {
        self.pipeline.database_stats().await
    }
}
