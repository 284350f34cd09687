//! Self-published mint metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Event;

/// Metadata record announced by a mint operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataRecord {
    /// Mint url
    pub url: String,

    /// Author public key
    #[serde(default)]
    pub pubkey: String,

    /// Value of the `d` tag
    #[serde(rename = "d", default)]
    pub discriminator: String,

    /// Parsed JSON content, `None` when the content was not JSON
    #[serde(default)]
    pub content: Option<Value>,

    /// Unix timestamp (seconds)
    #[serde(default)]
    pub created_at: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Event>,
}
