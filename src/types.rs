//! Persisted record types and identifiers.

use crate::path::{host_of_package, parse_person_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version written into every persisted record.
pub const SCHEMA_VERSION: u32 = 2;

/// Logical collections of the persistent store.
pub mod collections {
    /// Package frontier
    pub const CRAWLER_PACKAGE: &str = "crawler";
    /// Author frontier
    pub const CRAWLER_PERSON: &str = "crawler-person";
    /// Pushed documents waiting for the indexing pass
    pub const FETCHED_DOC: &str = "fetched-docs";
    /// Indexed documents
    pub const DOC: &str = "doc";
    /// Packages whose importers must be recomputed
    pub const TO_UPDATE: &str = "to-update";

    pub const INDEX_PREFIX: &str = "index:";
    pub const INDEX_FIELD: &str = "doc";
    pub const IMPORTS_PREFIX: &str = "import:";
    pub const IMPORTS_FIELD: &str = "import";

    /// Content index collection (`index:doc`)
    pub const INDEX: &str = "index:doc";
    /// Import-graph index collection (`import:import`)
    pub const IMPORTS: &str = "import:import";

    pub const ALL: &[&str] = &[
        CRAWLER_PACKAGE,
        CRAWLER_PERSON,
        FETCHED_DOC,
        TO_UPDATE,
        DOC,
        INDEX,
        IMPORTS,
    ];
}

/// One of the two crawl frontiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frontier {
    Package,
    Author,
}

impl Frontier {
    /// Store collection backing this frontier.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Package => collections::CRAWLER_PACKAGE,
            Self::Author => collections::CRAWLER_PERSON,
        }
    }

    /// Origin host implied by an entry id of this frontier.
    pub fn host_of(self, id: &str) -> String {
        match self {
            Self::Package => host_of_package(id),
            Self::Author => parse_person_id(id)
                .map(|(site, _)| site.to_lowercase())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Package => "package",
            Self::Author => "author",
        })
    }
}

/// Scheduling state of one package or author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlEntry {
    pub version: u32,
    /// Earliest time the entry may be crawled again. Stored as epoch
    /// milliseconds so store range filters order it numerically.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due_time: DateTime<Utc>,
    /// Origin host, used to partition work for rate limiting
    pub host: String,
}

impl Default for CrawlEntry {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            due_time: DateTime::<Utc>::UNIX_EPOCH,
            host: String::new(),
        }
    }
}

impl CrawlEntry {
    pub const DUE_TIME_FIELD: &'static str = "due_time";
    pub const HOST_FIELD: &'static str = "host";

    pub fn new(due_time: DateTime<Utc>, host: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            due_time,
            host: host.into(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_time < now
    }
}

/// Indexed metadata of one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub version: u32,
    pub name: String,
    /// Primary key
    pub import_path: String,
    pub author: String,
    pub synopsis: String,
    pub description: String,
    pub readme_name: String,
    pub readme_text: String,
    pub project_url: String,
    /// Negative when the fetcher could not tell
    pub star_count: i64,
    pub last_updated: DateTime<Utc>,
    /// Packages this one imports
    pub declared_imports: Vec<String>,
    /// Packages importing this one; derived from the import index
    pub importers: Vec<String>,
    /// Cached authority score. Below 1 means never computed.
    pub static_score: f64,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            name: String::new(),
            import_path: String::new(),
            author: String::new(),
            synopsis: String::new(),
            description: String::new(),
            readme_name: String::new(),
            readme_text: String::new(),
            project_url: String::new(),
            star_count: 0,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            declared_imports: Vec::new(),
            importers: Vec::new(),
            static_score: 0.0,
        }
    }
}

impl Document {
    /// True while the cached static score has never been computed.
    pub fn needs_static_score(&self) -> bool {
        self.static_score < 1.0
    }
}

/// One (token, document id) membership of an inverted index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexEntry {
    pub token: String,
    pub id: String,
}

impl IndexEntry {
    pub const TOKEN_FIELD: &'static str = "token";
    pub const ID_FIELD: &'static str = "id";

    /// Storage key of a membership. Tokens never contain spaces.
    pub fn key(token: &str, id: &str) -> String {
        format!("{} {}", token, id)
    }
}

/// Marker record of the reindex worklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMarker {}
