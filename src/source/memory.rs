//! In-memory event source.
//!
//! Holds published events and answers queries the way a relay would:
//! filtered by kind, newest first, capped by a limit. Newly published events
//! are fanned out to live subscribers.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::error::{AppError, Result};
use crate::models::{
    Event, MINT_INFO_KIND, MetadataRecord, REVIEW_KIND, Review, parse_metadata_event,
    parse_review_event,
};
use crate::source::{EventSource, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event source backed by a list of events in memory.
#[derive(Default)]
pub struct MemoryEventSource {
    events: Mutex<Vec<Event>>,
    metadata_subscribers: Mutex<Vec<UnboundedSender<MetadataRecord>>>,
    review_subscribers: Mutex<Vec<UnboundedSender<Review>>>,
    closed: AtomicBool,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-populated with events.
    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    /// Load events from a JSON file holding an array of events.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let events: Vec<Event> = serde_json::from_slice(&bytes)?;
        log::info!(
            "Loaded {} events from {}",
            events.len(),
            path.as_ref().display()
        );
        Ok(Self::with_events(events))
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store an event and deliver it to matching live subscribers.
    pub fn publish(&self, event: Event) {
        match event.kind {
            MINT_INFO_KIND => {
                if let Some(record) = parse_metadata_event(&event) {
                    lock(&self.metadata_subscribers).retain(|tx| tx.send(record.clone()).is_ok());
                }
            }
            REVIEW_KIND => {
                let reviews = parse_review_event(&event);
                if !reviews.is_empty() {
                    lock(&self.review_subscribers).retain(|tx| {
                        reviews.iter().all(|review| tx.send(review.clone()).is_ok())
                    });
                }
            }
            _ => {}
        }
        lock(&self.events).push(event);
    }

    fn ensure_open(&self, context: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::event_source(context, "source is closed"));
        }
        Ok(())
    }

    /// Newest `limit` events of a kind that satisfy `filter`.
    fn newest<F>(&self, kind: u32, limit: usize, filter: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let mut matching: Vec<Event> = lock(&self.events)
            .iter()
            .filter(|e| e.kind == kind && filter(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        matching
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn query_metadata_records(&self, limit: usize) -> Result<Vec<MetadataRecord>> {
        self.ensure_open("query_metadata_records")?;
        Ok(self
            .newest(MINT_INFO_KIND, limit, |_| true)
            .iter()
            .filter_map(parse_metadata_event)
            .collect())
    }

    async fn query_review_records(&self, limit: usize) -> Result<Vec<Review>> {
        self.ensure_open("query_review_records")?;
        Ok(self
            .newest(REVIEW_KIND, limit, |_| true)
            .iter()
            .flat_map(parse_review_event)
            .collect())
    }

    async fn query_reviews_for_url(&self, url: &str, limit: usize) -> Result<Vec<Review>> {
        self.ensure_open("query_reviews_for_url")?;
        if !url.starts_with("http") {
            return Ok(Vec::new());
        }

        let references_url = |e: &Event| {
            e.tags
                .iter()
                .any(|t| t.name() == Some("u") && t.value() == Some(url))
        };
        Ok(self
            .newest(REVIEW_KIND, limit, references_url)
            .iter()
            .flat_map(parse_review_event)
            .collect())
    }

    async fn subscribe_metadata(&self) -> Result<Subscription<MetadataRecord>> {
        self.ensure_open("subscribe_metadata")?;
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.metadata_subscribers).push(tx);
        Ok(Subscription::new(rx))
    }

    async fn subscribe_reviews(&self) -> Result<Subscription<Review>> {
        self.ensure_open("subscribe_reviews")?;
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.review_subscribers).push(tx);
        Ok(Subscription::new(rx))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.metadata_subscribers).clear();
        lock(&self.review_subscribers).clear();
    }
}
