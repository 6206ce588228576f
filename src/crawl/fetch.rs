//! The source of package and author metadata.

use crate::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata of one package as returned by a fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchedPackage {
    pub import_path: String,
    pub name: String,
    pub synopsis: String,
    /// Package documentation
    pub description: String,
    pub readme_name: String,
    pub readme_text: String,
    pub project_url: String,
    /// Negative when unknown
    pub star_count: i64,
    /// Packages imported by this one
    pub imports: Vec<String>,
    /// Other packages mentioned by this one (docs, examples, ...)
    pub references: Vec<String>,
}

/// Fetches package and author metadata from origin hosts.
///
/// Implementations return [`FetchError::Invalid`] when the target does not
/// exist, so the scheduler can evict it, and [`FetchError::Transient`] for
/// everything else.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_package(&self, import_path: &str) -> Result<FetchedPackage, FetchError>;

    /// List the project import paths owned by `username` on `site`.
    async fn fetch_author(&self, site: &str, username: &str) -> Result<Vec<String>, FetchError>;
}
