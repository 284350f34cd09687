//! Derived views over the aggregated data: recommendations, statistics and
//! the export format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{FetchResult, Review};

/// Ranked view of a single mint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub url: String,
    pub reviews_count: usize,
    /// Mean of ratings within 1..=5, absent when there are none
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_http_info_fetch_at: Option<i64>,
}

impl Recommendation {
    /// Average rating used for ranking; absent counts as 0.
    pub fn ranking_rating(&self) -> f64 {
        self.average_rating.unwrap_or(0.0)
    }
}

/// Plain counts over the aggregator stores.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub mint_count: usize,
    pub total_reviews: usize,
    pub mints_with_reviews: usize,
    pub mints_with_metadata: usize,
    pub mints_with_fetch_result: usize,
}

/// Review as written to an export, without url or source event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedReview {
    #[serde(rename = "eventId", default)]
    pub event_id: String,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: String,
}

impl ExportedReview {
    /// Rebuild the review for the given url.
    pub fn into_review(self, url: &str) -> Review {
        Review {
            event_id: self.event_id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            rating: self.rating,
            comment: self.comment,
            url: url.to_string(),
            raw: None,
        }
    }
}

impl From<&Review> for ExportedReview {
    fn from(review: &Review) -> Self {
        Self {
            event_id: review.event_id.clone(),
            pubkey: review.pubkey.clone(),
            created_at: review.created_at,
            rating: review.rating,
            comment: review.comment.clone(),
        }
    }
}

/// Reviews of one mint in an export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedReviews {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub reviews: Vec<ExportedReview>,
}

/// Serializable snapshot of the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExportData {
    #[serde(default)]
    pub reviews: Vec<ExportedReviews>,
    #[serde(rename = "httpInfo", default)]
    pub http_info: Vec<FetchResult>,
}
