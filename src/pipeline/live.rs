// src/pipeline/live.rs

//! Live ingestion of newly published events.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::task::{AbortHandle, JoinHandle};

use crate::error::Result;
use crate::models::{MetadataRecord, Recommendation, Review};
use crate::source::EventSource;

use super::discovery::Shared;

pub type MintInfoCallback = Arc<dyn Fn(&MetadataRecord) + Send + Sync>;
pub type ReviewCallback = Arc<dyn Fn(&Review) + Send + Sync>;
pub type UpdateCallback = Arc<dyn Fn(&[Recommendation]) + Send + Sync>;

/// Callbacks fired by a live subscription.
#[derive(Clone, Default)]
pub struct LiveCallbacks {
    pub on_mint_info: Option<MintInfoCallback>,
    pub on_review: Option<ReviewCallback>,
    /// Receives the full recommendation list after every accepted event
    pub on_update: Option<UpdateCallback>,
}

impl LiveCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_mint_info(mut self, f: impl Fn(&MetadataRecord) + Send + Sync + 'static) -> Self {
        self.on_mint_info = Some(Arc::new(f));
        self
    }

    pub fn on_review(mut self, f: impl Fn(&Review) + Send + Sync + 'static) -> Self {
        self.on_review = Some(Arc::new(f));
        self
    }

    pub fn on_update(mut self, f: impl Fn(&[Recommendation]) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }
}

/// Handle to the background tasks of a live subscription.
#[derive(Debug)]
pub struct LiveSubscription {
    tasks: Vec<JoinHandle<()>>,
}

impl LiveSubscription {
    pub(crate) async fn start(
        source: &dyn EventSource,
        shared: Shared,
        callbacks: LiveCallbacks,
    ) -> Result<Self> {
        let mut metadata = source.subscribe_metadata().await?;
        let mut reviews = source.subscribe_reviews().await?;
        let callbacks = Arc::new(callbacks);

        let metadata_task = {
            let shared = shared.clone();
            let callbacks = Arc::clone(&callbacks);
            tokio::spawn(async move {
                while let Some(record) = metadata.recv().await {
                    on_metadata(&shared, &callbacks, record).await;
                }
                log::debug!("Mint info subscription ended");
            })
        };

        let review_task = tokio::spawn(async move {
            while let Some(review) = reviews.recv().await {
                on_review(&shared, &callbacks, review).await;
            }
            log::debug!("Review subscription ended");
        });

        log::info!("Live subscription started");
        Ok(Self {
            tasks: vec![metadata_task, review_task],
        })
    }

    pub(crate) fn abort_handles(&self) -> Vec<AbortHandle> {
        self.tasks.iter().map(JoinHandle::abort_handle).collect()
    }

    /// Whether both event streams have ended.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Stop ingesting events.
    pub fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        log::info!("Live subscription closed");
    }
}

async fn on_metadata(shared: &Shared, callbacks: &LiveCallbacks, record: MetadataRecord) {
    let url = record.url.clone();
    if !shared.aggregator().add_metadata(record.clone()) {
        return;
    }
    log::debug!("New mint info for {}", url);

    let settings = shared.settings();
    if shared.is_stale(&url, settings.cache_max_age_secs) {
        let result = shared.fetcher.fetch_one(&url, settings.http_timeout).await;
        shared.aggregator().set_fetch_result(&url, result.clone());
        shared.persist_fetch_result(&result).await;
    }

    if let Some(callback) = &callbacks.on_mint_info {
        invoke("mint info", || callback(&record));
    }
    notify_update(shared, callbacks);
}

async fn on_review(shared: &Shared, callbacks: &LiveCallbacks, review: Review) {
    let added = shared.ingest_reviews(vec![review]);
    let Some(review) = added.first() else {
        return;
    };
    log::debug!("New review {} for {}", review.event_id, review.url);
    shared.persist_reviews(&added).await;

    if let Some(callback) = &callbacks.on_review {
        invoke("review", || callback(review));
    }
    notify_update(shared, callbacks);
}

fn notify_update(shared: &Shared, callbacks: &LiveCallbacks) {
    let Some(callback) = &callbacks.on_update else {
        return;
    };
    let recommendations = shared.aggregator().recommendations();
    invoke("update", || callback(&recommendations));
}

fn invoke(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::warn!("Live {} callback panicked", name);
    }
}
