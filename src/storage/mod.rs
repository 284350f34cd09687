//! Storage abstractions for the persistent mint cache.
//!
//! The cache keeps reviews and the latest fetch result per mint between
//! discovery runs. It is strictly best-effort: callers log failures and carry
//! on with in-memory data.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Configuration
//! ├── reviews.json          # Reviews keyed by event id and url
//! └── fetch_results.json    # Latest /v1/info result per mint url
//! ```

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FetchResult, Review, StorageConfig};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for persistent cache backends.
#[async_trait]
pub trait MintStorage: Send + Sync {
    /// Insert or replace a single review.
    async fn save_review(&self, review: &Review) -> Result<()>;

    /// Insert or replace several reviews in one write.
    async fn save_reviews(&self, reviews: &[Review]) -> Result<()>;

    /// Every stored review.
    async fn get_all_reviews(&self) -> Result<Vec<Review>>;

    /// Insert or replace the fetch result for `url`.
    async fn save_fetch_result(&self, url: &str, result: &FetchResult) -> Result<()>;

    /// Every stored fetch result.
    async fn get_all_fetch_results(&self) -> Result<Vec<FetchResult>>;

    /// Remove all stored data.
    async fn clear_all(&self) -> Result<()>;

    /// Release any held resources.
    async fn close(&self) -> Result<()>;
}

/// Open the configured cache backend, or `None` when storage is disabled.
pub fn open(config: &StorageConfig) -> Option<Arc<dyn MintStorage>> {
    if !config.enabled {
        log::debug!("Storage disabled, running in memory");
        return None;
    }
    Some(Arc::new(LocalStorage::new(&config.dir)))
}
