//! Result of an HTTP info fetch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::now_unix;

/// Outcome of the most recent `/v1/info` fetch for a mint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResult {
    /// Mint url as requested (not normalized)
    #[serde(default)]
    pub url: String,

    /// Parsed info body on success
    #[serde(default)]
    pub info: Option<Value>,

    /// Whether the fetch failed
    #[serde(default)]
    pub error: bool,

    /// Unix timestamp of completion; 0 means unknown
    #[serde(rename = "fetchedAt", default)]
    pub fetched_at: i64,
}

impl FetchResult {
    /// Successful fetch completed now.
    pub fn success(url: impl Into<String>, info: Value) -> Self {
        Self {
            url: url.into(),
            info: Some(info),
            error: false,
            fetched_at: now_unix(),
        }
    }

    /// Failed fetch completed now.
    pub fn failure(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            info: None,
            error: true,
            fetched_at: now_unix(),
        }
    }

    /// Timestamp of the fetch, `None` when unknown.
    pub fn fetch_time(&self) -> Option<i64> {
        Some(self.fetched_at).filter(|t| *t > 0)
    }
}
