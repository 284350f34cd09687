//! Event source abstractions.
//!
//! The discovery orchestrator reads mint metadata and reviews through
//! [`EventSource`]. Relay clients live outside this crate; the bundled
//! [`MemoryEventSource`] serves events held in memory or loaded from disk.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{MetadataRecord, Review};

// Re-export for convenience
pub use memory::MemoryEventSource;

/// Live stream of records from an event source.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self { receiver }
    }

    /// Next record, `None` once the subscription is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Stop receiving new records. Already buffered records stay readable.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Source of mint metadata and review records.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Query up to `limit` metadata records, newest first.
    async fn query_metadata_records(&self, limit: usize) -> Result<Vec<MetadataRecord>>;

    /// Query reviews from up to `limit` review events, newest first.
    async fn query_review_records(&self, limit: usize) -> Result<Vec<Review>>;

    /// Query reviews from up to `limit` review events referencing `url`.
    async fn query_reviews_for_url(&self, url: &str, limit: usize) -> Result<Vec<Review>>;

    /// Subscribe to newly published metadata records.
    async fn subscribe_metadata(&self) -> Result<Subscription<MetadataRecord>>;

    /// Subscribe to newly published reviews.
    async fn subscribe_reviews(&self) -> Result<Subscription<Review>>;

    /// Release connections and end all subscriptions.
    async fn close(&self);
}
