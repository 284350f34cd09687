// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::FetcherConfig;

/// Well-known path serving a mint's info document.
pub const INFO_PATH: &str = "/v1/info";

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &FetcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_millis(config.timeout_ms))
        .build()?;
    Ok(client)
}

/// Build the info url for a mint base url.
///
/// Returns `None` for urls that are empty or lack an http scheme prefix.
/// Exactly one trailing slash is stripped before appending the path.
pub fn info_url(base: &str) -> Option<String> {
    if base.is_empty() || !base.starts_with("http") {
        return None;
    }
    let base = base.strip_suffix('/').unwrap_or(base);
    Some(format!("{base}{INFO_PATH}"))
}
