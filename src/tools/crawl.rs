//! Frontier and ingest handlers.

use crate::crawl::FetchedPackage;
use crate::engine::Engine;
use crate::error::Result;
use crate::types::Frontier;
use rmcp::schemars;
use serde::Deserialize;

/// Frontier selector for tools.
#[derive(Debug, Clone, Copy, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FrontierKind {
    #[default]
    Package,
    Author,
}

impl From<FrontierKind> for Frontier {
    fn from(kind: FrontierKind) -> Self {
        match kind {
            FrontierKind::Package => Self::Package,
            FrontierKind::Author => Self::Author,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddPackagesRequest {
    /// Import paths to schedule for crawling
    pub import_paths: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListDueRequest {
    /// Frontier to list: package or author (default: package)
    #[serde(default)]
    pub frontier: FrontierKind,
    /// Maximum number of ids; negative for all (default: 10)
    #[serde(default = "default_limit")]
    pub limit: i64,
}

const fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PushDocumentRequest {
    pub import_path: String,
    pub name: String,
    #[serde(default)]
    pub synopsis: String,
    /// Package documentation
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub readme_name: String,
    #[serde(default)]
    pub readme_text: String,
    #[serde(default)]
    pub project_url: String,
    /// Star count; omit or pass a negative number when unknown
    #[serde(default)]
    pub star_count: Option<i64>,
    /// Import paths of imported packages
    #[serde(default)]
    pub imports: Vec<String>,
    /// Import paths of other referenced packages
    #[serde(default)]
    pub references: Vec<String>,
}

impl From<PushDocumentRequest> for FetchedPackage {
    fn from(request: PushDocumentRequest) -> Self {
        Self {
            import_path: request.import_path.trim().to_string(),
            name: request.name,
            synopsis: request.synopsis,
            description: request.description,
            readme_name: request.readme_name,
            readme_text: request.readme_text,
            project_url: request.project_url,
            star_count: request.star_count.unwrap_or(-1),
            imports: request.imports,
            references: request.references,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PushAuthorRequest {
    /// Host of the account, e.g. `github.com`
    pub site: String,
    pub username: String,
    /// Import paths of the author's projects
    pub projects: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PackageRequest {
    /// Import path of the package
    pub import_path: String,
}

pub async fn handle_add_packages(engine: &Engine, request: AddPackagesRequest) -> Result<String> {
    let added = engine.append_packages(&request.import_paths).await;
    Ok(format!(
        "Scheduled {} new packages ({} already known or invalid).",
        added,
        request.import_paths.len() - added
    ))
}

pub async fn handle_list_due(engine: &Engine, request: ListDueRequest) -> Result<String> {
    let frontier = Frontier::from(request.frontier);
    let ids = engine.list_due(frontier, request.limit).await?;
    if ids.is_empty() {
        return Ok(format!("No {} entries are due.", frontier));
    }

    let mut output = format!("{} due {} entries:\n", ids.len(), frontier);
    for id in &ids {
        output.push_str(id);
        output.push('\n');
    }
    Ok(output)
}

pub async fn handle_push_document(engine: &Engine, request: PushDocumentRequest) -> Result<String> {
    let package = FetchedPackage::from(request);
    let path = package.import_path.clone();
    engine.push_document(package).await?;
    Ok(format!("Queued {} for indexing.", path))
}

pub async fn handle_push_author(engine: &Engine, request: PushAuthorRequest) -> Result<String> {
    let has_new = engine
        .push_author(request.site.trim(), request.username.trim(), &request.projects)
        .await?;
    Ok(if has_new {
        format!("Ingested {} projects; new packages were scheduled.", request.projects.len())
    } else {
        format!("Ingested {} projects; nothing new.", request.projects.len())
    })
}

pub async fn handle_report_invalid(engine: &Engine, request: PackageRequest) -> Result<String> {
    let path = request.import_path.trim();
    engine.report_invalid(path).await;
    Ok(format!("Removed {}.", path))
}

pub async fn handle_touch(engine: &Engine, request: PackageRequest) -> Result<String> {
    let path = request.import_path.trim();
    Ok(if engine.touch(path).await {
        format!("{} is already due; crawl it now.", path)
    } else {
        format!("{} is scheduled for an early crawl.", path)
    })
}

pub async fn handle_process_pending(engine: &Engine) -> Result<String> {
    let (indexed, refreshed) = engine.process_pending().await?;
    Ok(format!(
        "Indexed {} fetched documents, refreshed {} documents.",
        indexed, refreshed
    ))
}
