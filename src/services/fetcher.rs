//! Mint info fetcher service.
//!
//! Fetches `/v1/info` from mints, either one at a time or as a batch run by a
//! fixed pool of workers sharing one cursor over the deduplicated url list.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::models::{FetchResult, FetcherConfig};
use crate::utils::http::{create_async_client, info_url};
use crate::utils::{dedup_preserving_order, now_unix};

/// Anything able to fetch the info document of a single mint.
///
/// Implementations never fail: every problem is reported through
/// `FetchResult::error`.
#[async_trait]
pub trait InfoFetcher: Send + Sync {
    async fn fetch_one(&self, url: &str, timeout: Duration) -> FetchResult;
}

/// Callback invoked once per completed fetch.
pub type ResultCallback<'a> = &'a (dyn Fn(&FetchResult) + Send + Sync);

/// Options for [`fetch_batch`].
#[derive(Clone, Copy)]
pub struct BatchOptions<'a> {
    /// Number of workers; never more than the number of unique urls
    pub concurrency: usize,
    /// Pause after each fetch before a worker pulls the next url
    pub delay: Duration,
    /// Per-request timeout
    pub timeout: Duration,
    /// Invoked synchronously in completion order
    pub on_result: Option<ResultCallback<'a>>,
}

impl BatchOptions<'_> {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            delay: config.delay(),
            timeout: config.timeout(),
            on_result: None,
        }
    }
}

impl Default for BatchOptions<'_> {
    fn default() -> Self {
        Self::from_config(&FetcherConfig::default())
    }
}

/// reqwest-backed fetcher for mint info documents.
#[derive(Clone)]
pub struct MintInfoFetcher {
    client: Client,
}

impl MintInfoFetcher {
    /// Create a fetcher with a client built from the given configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get_info(&self, info_url: &str, timeout: Duration) -> Result<Option<Value>> {
        let target = Url::parse(info_url)?;
        let response = self
            .client
            .get(target)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            log::debug!("{} responded with {}", info_url, response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body).ok())
    }
}

#[async_trait]
impl InfoFetcher for MintInfoFetcher {
    async fn fetch_one(&self, url: &str, timeout: Duration) -> FetchResult {
        let Some(target) = info_url(url) else {
            log::debug!("Skipping fetch for invalid mint url {:?}", url);
            return FetchResult::failure(url);
        };

        match self.get_info(&target, timeout).await {
            Ok(Some(info)) => FetchResult::success(url, info),
            Ok(None) => FetchResult::failure(url),
            Err(e) => {
                log::debug!("Failed to fetch {}: {}", target, e);
                FetchResult::failure(url)
            }
        }
    }
}

/// Fetch info for many mints with a bounded worker pool.
///
/// Urls are deduplicated first; `min(concurrency, unique)` workers then pull
/// indices from a shared cursor so each url is fetched exactly once. A worker
/// sleeps `delay` after every fetch except the one for the final index.
/// Results are returned in completion order.
pub async fn fetch_batch<F>(
    fetcher: &F,
    urls: &[String],
    options: &BatchOptions<'_>,
) -> Vec<FetchResult>
where
    F: InfoFetcher + ?Sized,
{
    let unique = dedup_preserving_order(urls);
    if unique.is_empty() {
        return Vec::new();
    }

    let worker_count = options.concurrency.max(1).min(unique.len());
    let cursor = AtomicUsize::new(0);
    let results = Mutex::new(Vec::with_capacity(unique.len()));

    log::debug!(
        "Fetching info for {} mints with {} workers",
        unique.len(),
        worker_count
    );

    let (cursor, unique, results) = (&cursor, &unique, &results);
    let worker = move || async move {
        loop {
            let i = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(url) = unique.get(i) else {
                break;
            };

            let result = fetcher.fetch_one(url, options.timeout).await;
            if let Some(callback) = options.on_result {
                notify(callback, &result);
            }
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(result);

            if i + 1 < unique.len() && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
        }
    };

    join_all((0..worker_count).map(|_| worker())).await;

    std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Run a result callback, containing any panic it raises.
fn notify(callback: ResultCallback<'_>, result: &FetchResult) {
    if catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
        log::warn!("Result callback panicked for {}", result.url);
    }
}

/// Whether a cached result is younger than `max_age_secs`.
pub fn is_fresh(cached: Option<&FetchResult>, max_age_secs: u64) -> bool {
    is_fresh_at(cached.and_then(FetchResult::fetch_time), max_age_secs, now_unix())
}

/// Freshness check against an explicit clock.
pub fn is_fresh_at(fetched_at: Option<i64>, max_age_secs: u64, now: i64) -> bool {
    match fetched_at.filter(|t| *t > 0) {
        Some(fetched_at) => {
            now.saturating_sub(fetched_at) < i64::try_from(max_age_secs).unwrap_or(i64::MAX)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Fake fetcher counting calls per url and tracking peak parallelism.
    #[derive(Default)]
    struct CountingFetcher {
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl InfoFetcher for CountingFetcher {
        async fn fetch_one(&self, url: &str, _timeout: Duration) -> FetchResult {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("bad") {
                FetchResult::failure(url)
            } else {
                FetchResult::success(url, serde_json::json!({ "name": url }))
            }
        }
    }

    /// Fake fetcher that answers immediately.
    struct InstantFetcher;

    #[async_trait]
    impl InfoFetcher for InstantFetcher {
        async fn fetch_one(&self, url: &str, _timeout: Duration) -> FetchResult {
            FetchResult::success(url, serde_json::json!({}))
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://mint{i}.example.com")).collect()
    }

    fn options<'a>(concurrency: usize) -> BatchOptions<'a> {
        BatchOptions {
            concurrency,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
            on_result: None,
        }
    }

    #[tokio::test]
    async fn test_batch_fetches_each_url_once() {
        let fetcher = CountingFetcher::default();
        let results = fetch_batch(&fetcher, &urls(10), &options(3)).await;

        assert_eq!(results.len(), 10);
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 10);
        assert!(calls.values().all(|count| *count == 1));
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_batch_skips_delay_after_final_url() {
        let opts = BatchOptions {
            concurrency: 1,
            delay: Duration::from_millis(50),
            timeout: Duration::from_secs(1),
            on_result: None,
        };

        let started = std::time::Instant::now();
        let results = fetch_batch(&InstantFetcher, &urls(3), &opts).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 3);
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(150), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_batch_deduplicates_urls() {
        let fetcher = CountingFetcher::default();
        let mut input = urls(4);
        input.extend(urls(4));

        let results = fetch_batch(&fetcher, &input, &options(10)).await;

        assert_eq!(results.len(), 4);
        assert!(fetcher.calls.lock().unwrap().values().all(|c| *c == 1));
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_batch_empty_input() {
        let fetcher = CountingFetcher::default();
        let results = fetch_batch(&fetcher, &[], &options(5)).await;
        assert!(results.is_empty());
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_zero_concurrency_still_runs() {
        let fetcher = CountingFetcher::default();
        let results = fetch_batch(&fetcher, &urls(3), &options(0)).await;
        assert_eq!(results.len(), 3);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_callback_sees_every_result() {
        let fetcher = CountingFetcher::default();
        let seen = Mutex::new(Vec::new());
        let callback = |r: &FetchResult| seen.lock().unwrap().push(r.url.clone());

        let mut opts = options(2);
        opts.on_result = Some(&callback);
        let mut input = urls(5);
        input.push("https://bad.example.com".to_string());

        let results = fetch_batch(&fetcher, &input, &opts).await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 6);
        let ordered: Vec<_> = results.iter().map(|r| r.url.clone()).collect();
        assert_eq!(seen, ordered);
        assert_eq!(results.iter().filter(|r| r.error).count(), 1);
    }

    #[tokio::test]
    async fn test_batch_survives_panicking_callback() {
        let fetcher = CountingFetcher::default();
        let callback = |r: &FetchResult| {
            if r.url.contains("mint1.") {
                panic!("callback failure");
            }
        };

        let mut opts = options(3);
        opts.on_result = Some(&callback);
        let results = fetch_batch(&fetcher, &urls(6), &opts).await;

        assert_eq!(results.len(), 6);
    }

    #[tokio::test]
    async fn test_fetch_one_rejects_invalid_url() {
        let fetcher = MintInfoFetcher::new(&FetcherConfig::default()).unwrap();

        for url in ["not-a-url", ""] {
            let result = fetcher.fetch_one(url, Duration::from_millis(1000)).await;
            assert!(result.error);
            assert!(result.info.is_none());
            assert!(result.fetched_at > 0);
        }
    }

    /// Serve a single canned HTTP response per connection, recording request paths.
    async fn serve(status: &'static str, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let paths = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&paths);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                if let Some(path) = request.split_whitespace().nth(1) {
                    recorded.lock().unwrap().push(path.to_string());
                }
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/"), paths)
    }

    #[tokio::test]
    async fn test_fetch_one_success() {
        let (base, paths) = serve("200 OK", r#"{"name":"Test Mint","version":"1"}"#).await;
        let fetcher = MintInfoFetcher::new(&FetcherConfig::default()).unwrap();

        let result = fetcher.fetch_one(&base, Duration::from_secs(5)).await;

        assert!(!result.error);
        assert_eq!(result.url, base);
        assert_eq!(result.info.unwrap()["name"], "Test Mint");
        assert_eq!(paths.lock().unwrap().as_slice(), ["/v1/info"]);
    }

    #[tokio::test]
    async fn test_fetch_one_http_error_status() {
        let (base, _) = serve("404 Not Found", r#"{"detail":"missing"}"#).await;
        let fetcher = MintInfoFetcher::new(&FetcherConfig::default()).unwrap();

        let result = fetcher.fetch_one(&base, Duration::from_secs(5)).await;

        assert!(result.error);
        assert!(result.info.is_none());
    }

    #[tokio::test]
    async fn test_fetch_one_non_json_body() {
        let (base, _) = serve("200 OK", "<html>hello</html>").await;
        let fetcher = MintInfoFetcher::new(&FetcherConfig::default()).unwrap();

        let result = fetcher.fetch_one(&base, Duration::from_secs(5)).await;

        assert!(result.error);
        assert!(result.info.is_none());
    }

    #[tokio::test]
    async fn test_fetch_one_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without answering.
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let fetcher = MintInfoFetcher::new(&FetcherConfig::default()).unwrap();
        let started = std::time::Instant::now();
        let result = fetcher
            .fetch_one(&format!("http://{addr}"), Duration::from_millis(200))
            .await;

        assert!(result.error);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_is_fresh_boundaries() {
        let now = 1_700_000_000;
        assert!(is_fresh_at(Some(now), 3600, now));
        assert!(is_fresh_at(Some(now - 3599), 3600, now));
        assert!(!is_fresh_at(Some(now - 3600), 3600, now));
        assert!(!is_fresh_at(Some(now - 7200), 3600, now));
    }

    #[test]
    fn test_is_fresh_huge_max_age() {
        assert!(is_fresh_at(Some(100), u64::MAX, 100));
        assert!(is_fresh_at(Some(1), u64::MAX, 1_700_000_000));
    }

    #[test]
    fn test_is_fresh_missing_values() {
        assert!(!is_fresh(None, 3600));
        assert!(!is_fresh_at(None, 3600, 1_700_000_000));

        let mut result = FetchResult::failure("https://mint.example.com");
        assert!(is_fresh(Some(&result), 3600));

        result.fetched_at = 0;
        assert!(!is_fresh(Some(&result), 3600));
    }
}
