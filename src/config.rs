//! Runtime configuration loaded from TOML.

use crate::error::Result;
use anyhow::{Context, bail};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

/// Crawl scheduling and rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Base re-crawl age of a package entry
    pub package_age_hours: u64,
    /// Base re-crawl age of an author entry
    pub author_age_hours: u64,
    /// Delay between two fetches against the same host
    pub request_delay_ms: u64,
    /// Wall-clock budget of one crawl cycle
    pub cycle_deadline_secs: u64,
    /// Pause between two cycles of the background loop
    pub cycle_interval_secs: u64,
    /// Run crawl cycles in the background loop (requires a fetcher)
    pub enabled: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            package_age_hours: 10 * 24,
            author_age_hours: 10 * 24,
            request_delay_ms: 5_000,
            cycle_deadline_secs: 9 * 60,
            cycle_interval_secs: 60,
            enabled: false,
        }
    }
}

impl CrawlConfig {
    pub fn package_age(&self) -> Duration {
        Duration::hours(self.package_age_hours as i64)
    }

    pub fn author_age(&self) -> Duration {
        Duration::hours(self.author_age_hours as i64)
    }

    pub const fn request_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_delay_ms)
    }

    pub const fn cycle_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_deadline_secs)
    }

    pub const fn cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_interval_secs)
    }
}

/// Indexing passes over the fetched-document queue and the reindex worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub batch_limit: usize,
    pub deadline_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_limit: 1000,
            deadline_secs: 9 * 60,
        }
    }
}

impl IndexConfig {
    pub const fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Byte budget of a result excerpt
    pub snippet_bytes: usize,
    /// Results shown per page
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            snippet_bytes: 300,
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries held by the bundled LRU cache
    pub capacity: usize,
    /// Size of the cached due-list per frontier
    pub list_due_cache: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            list_due_cache: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot backing the bundled in-memory store
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
}

impl Config {
    /// Default location: `<config dir>/pkgsearch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pkgsearch").join("config.toml"))
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text)
                .with_context(|| format!("Invalid configuration in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values that would stall the scheduler or the search surface.
    pub fn validate(&self) -> Result<()> {
        if self.crawl.package_age_hours == 0 || self.crawl.author_age_hours == 0 {
            bail!("crawl ages must be > 0");
        }
        if self.search.snippet_bytes == 0 {
            bail!("search.snippet_bytes must be > 0");
        }
        if self.search.page_size == 0 {
            bail!("search.page_size must be > 0");
        }
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be > 0");
        }
        Ok(())
    }
}
