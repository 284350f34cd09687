// src/pipeline/discovery.rs

//! Discovery orchestrator.
//!
//! Ties the event source, the info fetcher, the aggregator and the optional
//! persistent cache together. A discovery run loads the cache, ingests mint
//! metadata and reviews, refreshes stale `/v1/info` documents and returns the
//! ranked recommendations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::Result;
use crate::models::{Config, ExportData, FetchResult, Recommendation, Review, Stats};
use crate::services::{Aggregator, BatchOptions, InfoFetcher, MintInfoFetcher, fetch_batch, is_fresh_at};
use crate::source::EventSource;
use crate::storage::{self, MintStorage};
use crate::utils::now_unix;

use super::live::{LiveCallbacks, LiveSubscription};
use super::progress::{Progress, ProgressCallback, report};

/// Runtime-adjustable settings of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub http_timeout: Duration,
    pub http_concurrency: usize,
    pub http_delay: Duration,
    pub cache_max_age_secs: u64,
    pub metadata_limit: usize,
    pub review_limit: usize,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            http_timeout: config.fetcher.timeout(),
            http_concurrency: config.fetcher.concurrency,
            http_delay: config.fetcher.delay(),
            cache_max_age_secs: config.discovery.cache_max_age_secs,
            metadata_limit: config.discovery.metadata_limit,
            review_limit: config.discovery.review_limit,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Partial settings update for [`MintDiscovery::configure`].
///
/// Unset and zero values leave the current setting unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigUpdate {
    pub http_timeout_ms: Option<u64>,
    pub http_concurrency: Option<usize>,
    pub http_delay_ms: Option<u64>,
    pub cache_max_age_secs: Option<u64>,
}

/// Options for a single [`MintDiscovery::discover`] run.
#[derive(Clone, Copy, Default)]
pub struct DiscoverOptions<'a> {
    /// Skip refreshing stale info documents
    pub skip_http_fetch: bool,
    /// Invoked at each phase boundary and after every fetch
    pub on_progress: Option<ProgressCallback<'a>>,
}

/// State shared between the orchestrator and its live subscription tasks.
#[derive(Clone)]
pub(crate) struct Shared {
    pub aggregator: Arc<Mutex<Aggregator>>,
    pub fetcher: Arc<dyn InfoFetcher>,
    pub storage: Option<Arc<dyn MintStorage>>,
    pub settings: Arc<Mutex<Settings>>,
}

impl Shared {
    pub fn aggregator(&self) -> MutexGuard<'_, Aggregator> {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> Settings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the info document for `url` is missing or older than the max age.
    pub fn is_stale(&self, url: &str, max_age_secs: u64) -> bool {
        let fetched_at = self
            .aggregator()
            .recommendation(url)
            .and_then(|r| r.last_http_info_fetch_at);
        !is_fresh_at(fetched_at, max_age_secs, now_unix())
    }

    /// Merge reviews, returning the ones that were accepted.
    pub fn ingest_reviews(&self, reviews: Vec<Review>) -> Vec<Review> {
        let mut aggregator = self.aggregator();
        reviews
            .into_iter()
            .filter(|review| aggregator.add_review(review.clone()))
            .collect()
    }

    pub async fn persist_reviews(&self, reviews: &[Review]) {
        let Some(storage) = &self.storage else {
            return;
        };
        if reviews.is_empty() {
            return;
        }
        if let Err(e) = storage.save_reviews(reviews).await {
            log::warn!("Failed to persist {} reviews: {}", reviews.len(), e);
        }
    }

    pub async fn persist_fetch_result(&self, result: &FetchResult) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.save_fetch_result(&result.url, result).await {
            log::warn!("Failed to persist fetch result for {}: {}", result.url, e);
        }
    }
}

/// Resets the in-progress flag when a discovery run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Mint discovery orchestrator.
pub struct MintDiscovery {
    source: Arc<dyn EventSource>,
    shared: Shared,
    discovering: AtomicBool,
    subscriptions: Mutex<Vec<AbortHandle>>,
}

impl MintDiscovery {
    /// Create an orchestrator with the reqwest-backed fetcher.
    pub fn new(
        config: &Config,
        source: Arc<dyn EventSource>,
        storage: Option<Arc<dyn MintStorage>>,
    ) -> Result<Self> {
        let fetcher = Arc::new(MintInfoFetcher::new(&config.fetcher)?);
        Ok(Self::with_fetcher(config, source, fetcher, storage))
    }

    /// Create an orchestrator using local file storage when enabled in `config`.
    pub fn from_config(config: &Config, source: Arc<dyn EventSource>) -> Result<Self> {
        Self::new(config, source, storage::open(&config.storage))
    }

    /// Create an orchestrator around any [`InfoFetcher`].
    pub fn with_fetcher(
        config: &Config,
        source: Arc<dyn EventSource>,
        fetcher: Arc<dyn InfoFetcher>,
        storage: Option<Arc<dyn MintStorage>>,
    ) -> Self {
        Self {
            source,
            shared: Shared {
                aggregator: Arc::new(Mutex::new(Aggregator::new())),
                fetcher,
                storage,
                settings: Arc::new(Mutex::new(Settings::from(config))),
            },
            discovering: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> Settings {
        self.shared.settings()
    }

    /// Whether a discovery run is currently active.
    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    /// Run a full discovery cycle and return the ranked recommendations.
    ///
    /// A call made while another run is active returns the current
    /// recommendations immediately. Event source and storage failures are
    /// logged and the run continues with whatever data is available.
    pub async fn discover(&self, options: DiscoverOptions<'_>) -> Vec<Recommendation> {
        if self
            .discovering
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Discovery already running, returning current recommendations");
            return self.recommendations();
        }
        let _guard = RunGuard(&self.discovering);
        let settings = self.settings();
        let on_progress = options.on_progress;

        self.load_from_storage().await;

        report(on_progress, &Progress::MintInfo);
        match self.source.query_metadata_records(settings.metadata_limit).await {
            Ok(records) => {
                let received = records.len();
                let added = self.shared.aggregator().add_metadata_batch(records);
                log::info!("Received {} mint info records ({} new)", received, added);
            }
            Err(e) => log::warn!("Failed to query mint info events: {}", e),
        }

        report(on_progress, &Progress::Reviews);
        match self.source.query_review_records(settings.review_limit).await {
            Ok(reviews) => {
                let received = reviews.len();
                let added = self.shared.ingest_reviews(reviews);
                log::info!("Received {} reviews ({} new)", received, added.len());
                self.shared.persist_reviews(&added).await;
            }
            Err(e) => log::warn!("Failed to query review events: {}", e),
        }

        if !options.skip_http_fetch {
            self.refresh_stale(&settings, on_progress).await;
        }

        report(on_progress, &Progress::Done);
        self.recommendations()
    }

    /// Fetch info for every known mint whose cached result is missing or stale.
    async fn refresh_stale(&self, settings: &Settings, on_progress: Option<ProgressCallback<'_>>) {
        let known = self.shared.aggregator().all_known_urls();
        let stale: Vec<String> = known
            .into_iter()
            .filter(|url| self.shared.is_stale(url, settings.cache_max_age_secs))
            .collect();

        report(on_progress, &Progress::Fetching { total: stale.len() });
        if stale.is_empty() {
            log::info!("All mint info is fresh");
            return;
        }
        log::info!("Fetching info for {} mints", stale.len());

        let results = self.fetch_and_merge(&stale, settings, on_progress).await;
        let failed = results.iter().filter(|r| r.error).count();
        log::info!(
            "Fetched info for {} mints ({} failed)",
            results.len(),
            failed
        );
    }

    /// Fetch info for the given mints regardless of freshness.
    ///
    /// Results are merged and persisted the same way as during `discover()`;
    /// persistence failures are logged and do not affect the returned results.
    pub async fn fetch_info(&self, urls: &[String]) -> Vec<FetchResult> {
        let settings = self.settings();
        self.fetch_and_merge(urls, &settings, None).await
    }

    /// Batch fetch `urls`, merging and persisting each result as it arrives.
    async fn fetch_and_merge(
        &self,
        urls: &[String],
        settings: &Settings,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Vec<FetchResult> {
        let (tx, mut rx) = mpsc::unbounded_channel::<FetchResult>();
        let shared = &self.shared;

        let batch = async move {
            let on_result = move |result: &FetchResult| {
                shared
                    .aggregator()
                    .set_fetch_result(&result.url, result.clone());
                let _ = tx.send(result.clone());
                report(
                    on_progress,
                    &Progress::Fetched {
                        url: result.url.clone(),
                        error: result.error,
                    },
                );
            };
            let options = BatchOptions {
                concurrency: settings.http_concurrency,
                delay: settings.http_delay,
                timeout: settings.http_timeout,
                on_result: Some(&on_result),
            };
            fetch_batch(shared.fetcher.as_ref(), urls, &options).await
        };

        let persist = async {
            while let Some(result) = rx.recv().await {
                self.shared.persist_fetch_result(&result).await;
            }
        };

        let (results, ()) = tokio::join!(batch, persist);
        results
    }

    /// Merge persisted reviews and fetch results into the aggregator.
    pub async fn load_from_storage(&self) {
        let Some(storage) = &self.shared.storage else {
            return;
        };

        match storage.get_all_reviews().await {
            Ok(reviews) => {
                let added = self.shared.aggregator().add_reviews(reviews);
                log::debug!("Loaded {} cached reviews", added);
            }
            Err(e) => log::warn!("Failed to load cached reviews: {}", e),
        }

        match storage.get_all_fetch_results().await {
            Ok(results) => {
                let count = results.len();
                self.shared.aggregator().set_fetch_results(results);
                log::debug!("Loaded {} cached fetch results", count);
            }
            Err(e) => log::warn!("Failed to load cached fetch results: {}", e),
        }
    }

    /// Start live ingestion of new metadata and review events.
    pub async fn subscribe(&self, callbacks: LiveCallbacks) -> Result<LiveSubscription> {
        let subscription =
            LiveSubscription::start(self.source.as_ref(), self.shared.clone(), callbacks).await?;
        self.live_handles().extend(subscription.abort_handles());
        Ok(subscription)
    }

    /// Number of live subscription tasks still running.
    pub fn active_subscriptions(&self) -> usize {
        self.live_handles().len()
    }

    /// Tracked subscription tasks, with finished ones pruned.
    fn live_handles(&self) -> MutexGuard<'_, Vec<AbortHandle>> {
        let mut handles = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles
    }

    /// Current ranked recommendations.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.shared.aggregator().recommendations()
    }

    /// Reviews aggregated for one mint, oldest first.
    pub fn reviews_for_mint(&self, url: &str) -> Vec<Review> {
        self.shared.aggregator().reviews_for_url(url).to_vec()
    }

    /// Query the event source for reviews of one mint and merge them.
    pub async fn fetch_reviews_for_mint(&self, url: &str) -> Vec<Review> {
        let limit = self.settings().review_limit;
        match self.source.query_reviews_for_url(url, limit).await {
            Ok(reviews) => {
                let added = self.shared.ingest_reviews(reviews);
                self.shared.persist_reviews(&added).await;
            }
            Err(e) => log::warn!("Failed to query reviews for {}: {}", url, e),
        }
        self.reviews_for_mint(url)
    }

    /// Drop all aggregated state and clear the persistent cache.
    pub async fn clear_cache(&self) {
        self.shared.aggregator().clear();
        if let Some(storage) = &self.shared.storage {
            if let Err(e) = storage.clear_all().await {
                log::warn!("Failed to clear storage: {}", e);
            }
        }
    }

    pub fn stats(&self) -> Stats {
        self.shared.aggregator().stats()
    }

    pub fn export_data(&self) -> ExportData {
        self.shared.aggregator().export()
    }

    pub fn import_data(&self, data: ExportData) {
        self.shared.aggregator().import(data);
    }

    /// Apply a partial settings update.
    pub fn configure(&self, update: ConfigUpdate) {
        let mut settings = self
            .shared
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(ms) = update.http_timeout_ms.filter(|v| *v > 0) {
            settings.http_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = update.http_concurrency.filter(|v| *v > 0) {
            settings.http_concurrency = n;
        }
        if let Some(ms) = update.http_delay_ms.filter(|v| *v > 0) {
            settings.http_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = update.cache_max_age_secs.filter(|v| *v > 0) {
            settings.cache_max_age_secs = secs;
        }
    }

    /// Stop live subscriptions and release the event source and storage.
    pub async fn close(&self) {
        let handles = std::mem::take(&mut *self.live_handles());
        for handle in handles {
            handle.abort();
        }
        self.source.close().await;
        if let Some(storage) = &self.shared.storage {
            if let Err(e) = storage.close().await {
                log::warn!("Failed to close storage: {}", e);
            }
        }
    }
}
