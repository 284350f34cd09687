//! Local filesystem storage implementation.
//!
//! Each store is a single JSON document rewritten atomically (write to a
//! temp file, then rename). Writes are serialized by an async lock so
//! concurrent saves from one process cannot lose updates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{FetchResult, Review};
use crate::storage::MintStorage;

const REVIEWS_KEY: &str = "reviews.json";
const FETCH_RESULTS_KEY: &str = "fetch_results.json";

/// Local filesystem storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Root directory of the cache.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_reviews(&self) -> Result<BTreeMap<String, Review>> {
        Ok(self.read_json(REVIEWS_KEY).await?.unwrap_or_default())
    }

    async fn load_fetch_results(&self) -> Result<BTreeMap<String, FetchResult>> {
        Ok(self.read_json(FETCH_RESULTS_KEY).await?.unwrap_or_default())
    }

    /// Reviews are keyed per event and url since one event can review several mints.
    fn review_key(review: &Review) -> String {
        format!("{}|{}", review.event_id, review.url)
    }
}

#[async_trait]
impl MintStorage for LocalStorage {
    async fn save_review(&self, review: &Review) -> Result<()> {
        self.save_reviews(std::slice::from_ref(review)).await
    }

    async fn save_reviews(&self, reviews: &[Review]) -> Result<()> {
        let valid: Vec<&Review> = reviews.iter().filter(|r| !r.event_id.is_empty()).collect();
        if valid.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut stored = self.load_reviews().await?;
        for review in valid {
            stored.insert(Self::review_key(review), review.without_raw());
        }
        self.write_json(REVIEWS_KEY, &stored).await?;
        log::debug!("Stored {} reviews in {}", stored.len(), REVIEWS_KEY);
        Ok(())
    }

    async fn get_all_reviews(&self) -> Result<Vec<Review>> {
        Ok(self.load_reviews().await?.into_values().collect())
    }

    async fn save_fetch_result(&self, url: &str, result: &FetchResult) -> Result<()> {
        if url.is_empty() {
            return Err(AppError::storage("fetch result without url"));
        }

        let _guard = self.write_lock.lock().await;
        let mut stored = self.load_fetch_results().await?;
        stored.insert(
            url.to_string(),
            FetchResult {
                url: url.to_string(),
                ..result.clone()
            },
        );
        self.write_json(FETCH_RESULTS_KEY, &stored).await
    }

    async fn get_all_fetch_results(&self) -> Result<Vec<FetchResult>> {
        Ok(self.load_fetch_results().await?.into_values().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for key in [REVIEWS_KEY, FETCH_RESULTS_KEY] {
            match tokio::fs::remove_file(self.path(key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AppError::Io(e)),
            }
        }
        log::info!("Cleared cache in {}", self.root_dir.display());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Every write is flushed and renamed before returning.
        Ok(())
    }
}
