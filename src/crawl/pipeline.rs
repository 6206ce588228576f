//! Ingest and indexing of fetched package metadata.
//!
//! Fetched documents land in a queue; the indexing pass turns each into a
//! searchable [`Document`], maintains the import graph and queues the
//! packages whose importers changed for a later refresh.

use super::fetch::FetchedPackage;
use super::frontier::Scheduler;
use crate::cache::VolatileCache;
use crate::config::IndexConfig;
use crate::error::StoreError;
use crate::path::{author_identity, author_of_package, is_valid_remote_path, person_id};
use crate::search::{TokenSet, Tokens, static_score, tokenize_all};
use crate::store::record::Record;
use crate::store::{CachedStore, Filter, MAX_BATCH, Query, Store, Table};
use crate::types::{Document, Frontier, SCHEMA_VERSION, UpdateMarker, collections};
use anyhow::{Context, bail};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sorted symmetric difference of two id lists.
pub fn diff_ids(old: &[String], new: &[String]) -> Vec<String> {
    let mut old: Vec<&String> = old.iter().collect();
    let mut new: Vec<&String> = new.iter().collect();
    old.sort_unstable();
    old.dedup();
    new.sort_unstable();
    new.dedup();

    let mut diff = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() || j < new.len() {
        match (old.get(i), new.get(j)) {
            (Some(a), Some(b)) if a == b => {
                i += 1;
                j += 1;
            }
            (Some(a), Some(b)) if a < b => {
                diff.push((*a).clone());
                i += 1;
            }
            (Some(_), Some(b)) | (None, Some(b)) => {
                diff.push((*b).clone());
                j += 1;
            }
            (Some(a), None) => {
                diff.push((*a).clone());
                i += 1;
            }
            (None, None) => break,
        }
    }
    diff
}

impl From<FetchedPackage> for Document {
    fn from(package: FetchedPackage) -> Self {
        let author = author_of_package(&package.import_path);
        let declared_imports = package
            .imports
            .into_iter()
            .filter(|path| is_valid_remote_path(path))
            .collect();

        Self {
            version: SCHEMA_VERSION,
            name: package.name,
            author,
            synopsis: package.synopsis,
            description: package.description,
            readme_name: package.readme_name,
            readme_text: package.readme_text,
            project_url: package.project_url,
            // Every negative count means "unknown"
            star_count: package.star_count.max(-1),
            last_updated: Utc::now(),
            declared_imports,
            import_path: package.import_path,
            ..Self::default()
        }
    }
}

/// Ingest, indexing and eviction of package documents.
pub struct Pipeline {
    scheduler: Arc<Scheduler>,
    docs: CachedStore<Document>,
    fetched: Table<Document>,
    to_update: Table<UpdateMarker>,
    index: TokenSet,
    imports: TokenSet,
    batch_limit: usize,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("scheduler", &self.scheduler)
            .field("batch_limit", &self.batch_limit)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn VolatileCache>,
        scheduler: Arc<Scheduler>,
        config: &IndexConfig,
    ) -> Self {
        Self {
            scheduler,
            docs: CachedStore::new(Arc::clone(&store), cache, collections::DOC),
            fetched: Table::new(Arc::clone(&store), collections::FETCHED_DOC),
            to_update: Table::new(Arc::clone(&store), collections::TO_UPDATE),
            index: TokenSet::new(Arc::clone(&store), collections::INDEX_PREFIX),
            imports: TokenSet::new(store, collections::IMPORTS_PREFIX),
            batch_limit: config.batch_limit,
        }
    }

    pub const fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub const fn docs(&self) -> &CachedStore<Document> {
        &self.docs
    }

    /// The content index over name, path, description, readme and author.
    pub const fn index(&self) -> &TokenSet {
        &self.index
    }

    /// The import graph: package → packages it imports.
    pub const fn imports(&self) -> &TokenSet {
        &self.imports
    }

    /// Queue fetched metadata for indexing and expand the frontiers from it.
    ///
    /// The package's author, imports and references are discovered and the
    /// package itself is rescheduled.
    pub async fn push_document(&self, package: FetchedPackage) -> crate::Result<()> {
        let path = package.import_path.clone();
        if !is_valid_remote_path(&path) {
            bail!("Invalid package path '{}'", path);
        }
        let references = package.references.clone();
        let doc = Document::from(package);

        self.fetched
            .put(&path, &doc)
            .await
            .with_context(|| format!("Failed to queue fetched document {}", path))?;

        if let Some((site, username)) = author_identity(&path) {
            self.scheduler.enqueue_author(&site, &username).await;
        }

        let mut discovered = 0;
        for id in doc.declared_imports.iter().chain(&references) {
            if self.scheduler.enqueue_package(id).await {
                discovered += 1;
            }
        }

        self.scheduler
            .reschedule(Frontier::Package, &path)
            .await
            .with_context(|| format!("Failed to reschedule {}", path))?;

        tracing::info!("Pushed {} ({} new packages discovered)", path, discovered);
        Ok(())
    }

    /// Ingest the projects of an author and reschedule the author.
    ///
    /// Returns whether any project was newly scheduled.
    pub async fn push_author(
        &self,
        site: &str,
        username: &str,
        projects: &[String],
    ) -> crate::Result<bool> {
        let mut has_new = false;
        for project in projects {
            if self.scheduler.enqueue_package(project.trim()).await {
                has_new = true;
            }
        }

        let id = person_id(site, username);
        self.scheduler
            .reschedule(Frontier::Author, &id)
            .await
            .with_context(|| format!("Failed to reschedule author {}", id))?;

        tracing::info!("Pushed author {} with {} projects", id, projects.len());
        Ok(has_new)
    }

    /// Discover a batch of packages. Returns how many were newly scheduled.
    pub async fn append_packages(&self, paths: &[String]) -> usize {
        let mut count = 0;
        for path in paths {
            if self.scheduler.enqueue_package(path.trim()).await {
                count += 1;
            }
        }
        count
    }

    /// Evict a package from the frontier, the documents and both indexes.
    ///
    /// The packages it imported are queued for a refresh so they lose it as
    /// an importer. Every step runs even if an earlier one failed.
    pub async fn report_invalid(&self, id: &str) {
        tracing::info!("Evicting invalid package {}", id);

        for target in self.imports_of(id).await {
            if let Err(e) = self.to_update.put(&target, &UpdateMarker {}).await {
                tracing::warn!("Queueing {} for update failed: {}", target, e);
            }
        }
        if let Err(e) = self.scheduler.evict(Frontier::Package, id).await {
            tracing::error!("Removing crawl entry of {} failed: {}", id, e);
        }
        if let Err(e) = self.docs.delete(id).await {
            tracing::error!("Removing document {} failed: {}", id, e);
        }
        if let Err(e) = self.fetched.delete(id).await {
            tracing::error!("Removing queued document {} failed: {}", id, e);
        }
        if let Err(e) = self.index.delete(collections::INDEX_FIELD, id).await {
            tracing::error!("Removing {} from the content index failed: {}", id, e);
        }
        if let Err(e) = self.imports.delete(collections::IMPORTS_FIELD, id).await {
            tracing::error!("Removing {} from the import index failed: {}", id, e);
        }
    }

    /// Declared imports of the saved document, or of the queued one.
    async fn imports_of(&self, id: &str) -> Vec<String> {
        match self.docs.get(id).await {
            Ok(Some(doc)) => return doc.declared_imports,
            Ok(None) => {}
            Err(e) => tracing::warn!("Loading document {} failed: {}", id, e),
        }
        match self.fetched.get(id).await {
            Ok(Some(doc)) => doc.declared_imports,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Loading queued document {} failed: {}", id, e);
                Vec::new()
            }
        }
    }

    async fn index_content(&self, doc: &Document) -> Result<(), StoreError> {
        let tokens = tokenize_all([
            doc.name.as_str(),
            doc.import_path.as_str(),
            doc.description.as_str(),
            doc.readme_text.as_str(),
            doc.author.as_str(),
        ]);
        self.index
            .index(collections::INDEX_FIELD, &doc.import_path, &tokens)
            .await?;
        self.docs.put(&doc.import_path, doc).await
    }

    /// Index a document and save it.
    ///
    /// Keeps the saved star count when the new one is unknown, refreshes the
    /// importers from the import graph and recomputes the static score.
    /// Packages gained or lost as imports are queued for a refresh.
    pub async fn process_document(&self, mut doc: Document) -> crate::Result<()> {
        let id = doc.import_path.clone();
        let saved = self
            .docs
            .get(&id)
            .await
            .with_context(|| format!("Failed to load saved document {}", id))?;

        if let Some(saved) = &saved {
            if doc.star_count < 0 {
                doc.star_count = saved.star_count;
            }
        }

        let target: Tokens = std::iter::once(id.clone()).collect();
        doc.importers = self
            .imports
            .search(collections::IMPORTS_FIELD, &target)
            .await
            .with_context(|| format!("Failed to look up importers of {}", id))?;

        let declared: Tokens = doc.declared_imports.iter().cloned().collect();
        self.imports
            .index(collections::IMPORTS_FIELD, &id, &declared)
            .await
            .with_context(|| format!("Failed to index imports of {}", id))?;

        doc.static_score = static_score(&doc);
        self.index_content(&doc)
            .await
            .with_context(|| format!("Failed to index {}", id))?;

        let old_imports = saved.map(|s| s.declared_imports).unwrap_or_default();
        let changed = diff_ids(&old_imports, &doc.declared_imports);
        for target in &changed {
            if let Err(e) = self.to_update.put(target, &UpdateMarker {}).await {
                tracing::warn!("Queueing {} for update failed: {}", target, e);
            }
        }

        tracing::debug!(
            "Processed {} (score {:.3}, {} importers, {} imports changed)",
            id,
            doc.static_score,
            doc.importers.len(),
            changed.len()
        );
        Ok(())
    }

    /// Re-process a stored document. Returns `false` when it does not exist.
    pub async fn update_document(&self, id: &str) -> crate::Result<bool> {
        let Some(doc) = self
            .docs
            .get(id)
            .await
            .with_context(|| format!("Failed to load document {}", id))?
        else {
            return Ok(false);
        };
        self.process_document(doc).await?;
        Ok(true)
    }

    /// Up to one batch of queued ids.
    async fn pending<T: Record>(&self, queue: &Table<T>) -> Result<Vec<String>, StoreError> {
        let query = Query::new(Filter::new()).limit(self.batch_limit).keys_only();
        let rows = queue.query(&query).await?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    /// Index queued fetched documents until the queue is empty or `ttl`
    /// elapses. Returns the number indexed. Failed documents stay queued.
    pub async fn index_fetched(&self, ttl: Duration) -> crate::Result<usize> {
        let started = Instant::now();
        let ids = self
            .pending(&self.fetched)
            .await
            .context("Failed to list fetched documents")?;

        let mut indexed = 0;
        for id in &ids {
            if started.elapsed() > ttl {
                tracing::info!("Indexing pass out of time after {} documents", indexed);
                break;
            }

            let doc = match self.fetched.get(id).await {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Loading fetched document {} failed: {}", id, e);
                    continue;
                }
            };

            if let Err(e) = self.process_document(doc).await {
                tracing::error!("Processing {} failed: {:#}", id, e);
                continue;
            }
            if let Err(e) = self.fetched.delete(id).await {
                tracing::warn!("Dequeuing {} failed: {}", id, e);
            }
            indexed += 1;
        }

        if !ids.is_empty() {
            tracing::info!("Indexed {} of {} fetched documents", indexed, ids.len());
        }
        Ok(indexed)
    }

    /// Refresh documents whose importers changed, until the worklist is empty
    /// or `ttl` elapses. Returns the number of worklist entries handled.
    pub async fn process_to_update(&self, ttl: Duration) -> crate::Result<usize> {
        let started = Instant::now();
        let ids = self
            .pending(&self.to_update)
            .await
            .context("Failed to list the update worklist")?;

        let mut handled = 0;
        for chunk in ids.chunks(MAX_BATCH) {
            for id in chunk {
                if started.elapsed() > ttl {
                    tracing::info!("Update pass out of time after {} documents", handled);
                    return Ok(handled);
                }
                if let Err(e) = self.update_document(id).await {
                    tracing::error!("Updating {} failed: {:#}", id, e);
                }
                if let Err(e) = self.to_update.delete(id).await {
                    tracing::warn!("Removing {} from the worklist failed: {}", id, e);
                }
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Record count of every logical collection; `-1` where counting failed.
    pub async fn database_stats(&self) -> Vec<(&'static str, i64)> {
        let store = self.fetched.store();
        let mut stats = Vec::with_capacity(collections::ALL.len());
        for &collection in collections::ALL {
            let count = match store.count(collection, &Filter::new()).await {
                Ok(count) => count as i64,
                Err(e) => {
                    tracing::warn!("Counting {} failed: {}", collection, e);
                    -1
                }
            };
            stats.push((collection, count));
        }
        stats
    }
}
