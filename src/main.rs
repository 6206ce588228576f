use clap::Parser;
use pkgsearch::cli::{Cli, Commands};
use pkgsearch::{
    Config, CrawlSupervisor, CrawlWorker, Engine, MemoryCache, MemoryStore, SearchServer, Store,
    VolatileCache,
};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;

async fn open_store(config: &Config) -> anyhow::Result<Arc<MemoryStore>> {
    let store = match &config.storage.snapshot {
        Some(path) => MemoryStore::load(path).await?,
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}

async fn save_store(store: &MemoryStore, config: &Config) {
    if let Some(path) = &config.storage.snapshot {
        if let Err(e) = store.save(path).await {
            tracing::error!("Saving snapshot to {} failed: {}", path.display(), e);
        }
    }
}

async fn serve(engine: Arc<Engine>, store: Arc<MemoryStore>) -> anyhow::Result<()> {
    let config = engine.config();
    let crawler = if config.crawl.enabled {
        let crawler = engine.crawler().cloned();
        if crawler.is_none() {
            tracing::warn!("Crawling is enabled but no fetcher is configured; only pushed metadata is indexed");
        }
        crawler
    } else {
        None
    };

    let mut worker = CrawlWorker::new(crawler, Arc::clone(engine.pipeline()), config);
    if let Some(path) = &config.storage.snapshot {
        worker = worker.with_snapshot(Arc::clone(&store), path.clone());
    }
    let supervisor = CrawlSupervisor::start(worker);

    tracing::info!("Starting pkgsearch MCP server");

    // Create and serve the MCP server over stdio
    let server = SearchServer::new(Arc::clone(&engine));
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("Error serving MCP server: {:?}", e);
    })?;

    // Wait for the service to complete
    let result = service.waiting().await;

    supervisor.stop().await;
    save_store(&store, engine.config()).await;
    result?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    // Logs go to stderr so they never interfere with MCP traffic on stdout
    pkgsearch::tracing::init(config.log.json);

    let store = open_store(&config).await?;
    let cache: Arc<dyn VolatileCache> = Arc::new(MemoryCache::new(config.cache.capacity));
    let engine = Arc::new(Engine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        cache,
        config,
    ));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(engine, store).await?,
        Commands::Search { query, page } => {
            let results = engine.search_page(&query, page).await?;
            print!("{}", results);
        }
        Commands::Stats => {
            println!("{}", engine.crawler_stats().await);
            println!();
            print!("{}", pkgsearch::tools::handle_database_stats(&engine).await);
        }
    }

    Ok(())
}
