//! Wire-format events and their conversion into domain records.
//!
//! Mints announce themselves with kind `38172` events carrying a `u` tag
//! with the mint url. Reviews are kind `38000` events tagged `k=38172` that
//! point at one or more mints through `u` tags.

use serde::{Deserialize, Serialize};

use crate::models::{MetadataRecord, Review};
use crate::services::parse_rating_and_comment;

/// Event kind for mint metadata announcements.
pub const MINT_INFO_KIND: u32 = 38172;

/// Event kind for recommendations/reviews.
pub const REVIEW_KIND: u32 = 38000;

/// Simple tag wrapper preserving tag fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from string slices.
    pub fn new(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| f.to_string()).collect())
    }

    /// Tag name (first field).
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Tag value (second field).
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    fn is_url_tag(&self) -> bool {
        self.name() == Some("u") && self.0.len() >= 2
    }
}

/// A signed event as delivered by a relay. Signatures are carried but not verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub kind: u32,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl Event {
    fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name() == Some(name))
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http")
}

/// Parse a mint metadata event.
///
/// Only the first `u` tag is considered; it must hold an http(s) url.
/// Content that is not valid JSON is kept as `None`.
pub fn parse_metadata_event(event: &Event) -> Option<MetadataRecord> {
    if event.kind != MINT_INFO_KIND {
        return None;
    }

    let url = event.tags.iter().find(|t| t.is_url_tag())?.value()?;
    if !is_http(url) {
        return None;
    }

    let content = if event.content.is_empty() {
        None
    } else {
        serde_json::from_str(&event.content).ok()
    };

    Some(MetadataRecord {
        url: url.to_string(),
        pubkey: event.pubkey.clone(),
        discriminator: event
            .find_tag("d")
            .and_then(Tag::value)
            .unwrap_or_default()
            .to_string(),
        content,
        created_at: event.created_at,
        raw: Some(event.clone()),
    })
}

/// Parse a review event into one review per referenced mint url.
pub fn parse_review_event(event: &Event) -> Vec<Review> {
    if event.kind != REVIEW_KIND {
        return Vec::new();
    }

    let kind_ref = MINT_INFO_KIND.to_string();
    if event.find_tag("k").and_then(Tag::value) != Some(kind_ref.as_str()) {
        return Vec::new();
    }

    let parsed = parse_rating_and_comment(&event.content);

    event
        .tags
        .iter()
        .filter(|t| t.is_url_tag())
        .filter_map(Tag::value)
        .filter(|url| is_http(url))
        .map(|url| Review {
            event_id: event.id.clone(),
            pubkey: event.pubkey.clone(),
            created_at: event.created_at,
            rating: parsed.rating,
            comment: parsed.comment.clone(),
            url: url.to_string(),
            raw: Some(event.clone()),
        })
        .collect()
}
