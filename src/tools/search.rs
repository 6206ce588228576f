//! Search and package view handlers.

use crate::engine::Engine;
use crate::error::Result;
use rmcp::schemars;
use serde::Deserialize;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    /// Free-text query; every word must match
    pub query: String,
    /// Zero-based result page (default: 0)
    #[serde(default)]
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ViewPackageRequest {
    /// Import path of the package, e.g. `github.com/user/repo`
    pub import_path: String,
}

/// Run a query and render one page of folded results.
pub async fn handle_search(engine: &Engine, request: SearchRequest) -> Result<String> {
    let query = request.query.trim();
    if query.is_empty() {
        return Ok("Empty query. Enter one or more words to search for.".to_string());
    }

    let page = engine.search_page(query, request.page.unwrap_or(0)).await?;
    if page.total_results == 0 {
        return Ok(format!(
            "No packages found for '{}'.\n\n\
             Search tips:\n\
             • Every word must match, so try fewer words\n\
             • Search uses stemming: 'parsing' matches 'parse'",
            query
        ));
    }
    if page.docs.is_empty() {
        return Ok(format!(
            "Page {} is past the end: '{}' has {} pages of results.",
            page.page + 1,
            query,
            page.page_count()
        ));
    }

    Ok(format!("Search results for '{}':\n{}", query, page))
}

/// Show a package, or where it stands in the crawl schedule.
pub async fn handle_view_package(engine: &Engine, request: ViewPackageRequest) -> Result<String> {
    let view = engine.view(request.import_path.trim()).await?;
    Ok(view.to_string())
}
