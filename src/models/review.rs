//! Review data structure.

use serde::{Deserialize, Serialize};

use crate::models::Event;

/// A review of a single mint, derived from one review event.
///
/// One event that references several mints yields one `Review` per url,
/// all sharing the same `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    /// Source event identifier
    #[serde(rename = "eventId", default)]
    pub event_id: String,

    /// Author public key
    #[serde(default)]
    pub pubkey: String,

    /// Unix timestamp (seconds); missing values count as 0
    #[serde(default)]
    pub created_at: u64,

    /// Rating 1-5, absent when the content carried no valid tag
    #[serde(default)]
    pub rating: Option<i32>,

    /// Free-text comment
    #[serde(default)]
    pub comment: String,

    /// Reviewed mint url
    #[serde(default)]
    pub url: String,

    /// Source event, never exported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Event>,
}

impl Review {
    /// Rating if it falls within the accepted 1..=5 range.
    pub fn valid_rating(&self) -> Option<i32> {
        self.rating.filter(|r| (1..=5).contains(r))
    }

    /// Copy of this review without the embedded source event.
    pub fn without_raw(&self) -> Self {
        Self {
            raw: None,
            ..self.clone()
        }
    }
}
