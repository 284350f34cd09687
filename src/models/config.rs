//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP info fetch settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Discovery cycle settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Persistent cache settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_ms == 0 {
            return Err(AppError::validation("fetcher.timeout_ms must be > 0"));
        }
        if self.fetcher.concurrency == 0 {
            return Err(AppError::validation("fetcher.concurrency must be > 0"));
        }
        if self.discovery.cache_max_age_secs == 0 {
            return Err(AppError::validation(
                "discovery.cache_max_age_secs must be > 0",
            ));
        }
        if self.discovery.metadata_limit == 0 || self.discovery.review_limit == 0 {
            return Err(AppError::validation("discovery query limits must be > 0"));
        }
        if self.storage.enabled && self.storage.dir.as_os_str().is_empty() {
            return Err(AppError::validation("storage.dir is empty"));
        }
        Ok(())
    }
}

/// HTTP client and batch fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum concurrent requests
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,

    /// Pause between requests of one worker in milliseconds
    #[serde(default = "defaults::delay_ms")]
    pub delay_ms: u64,
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_ms: defaults::timeout_ms(),
            concurrency: defaults::concurrency(),
            delay_ms: defaults::delay_ms(),
        }
    }
}

/// Discovery cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Seconds a fetched info result stays fresh
    #[serde(default = "defaults::cache_max_age_secs")]
    pub cache_max_age_secs: u64,

    /// Maximum metadata events per query
    #[serde(default = "defaults::query_limit")]
    pub metadata_limit: usize,

    /// Maximum review events per query
    #[serde(default = "defaults::query_limit")]
    pub review_limit: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_max_age_secs: defaults::cache_max_age_secs(),
            metadata_limit: defaults::query_limit(),
            review_limit: defaults::query_limit(),
        }
    }
}

/// Persistent cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Disable to run purely in memory
    #[serde(default = "defaults::storage_enabled")]
    pub enabled: bool,

    /// Directory holding the cache files
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::storage_enabled(),
            dir: defaults::storage_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Fetcher defaults
    pub fn user_agent() -> String {
        concat!("mint-discovery/", env!("CARGO_PKG_VERSION")).into()
    }
    pub fn timeout_ms() -> u64 {
        10_000
    }
    pub fn concurrency() -> usize {
        20
    }
    pub fn delay_ms() -> u64 {
        100
    }

    // Discovery defaults
    pub fn cache_max_age_secs() -> u64 {
        3600
    }
    pub fn query_limit() -> usize {
        5000
    }

    // Storage defaults
    pub fn storage_enabled() -> bool {
        true
    }
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
}
