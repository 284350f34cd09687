// src/models/mod.rs

//! Domain models for mint discovery.
//!
//! This module contains all data structures used throughout the library,
//! organized by their primary purpose.

mod config;
mod event;
mod fetch;
mod metadata;
mod recommendation;
mod review;

// Re-export all public types
pub use config::{Config, DiscoveryConfig, FetcherConfig, StorageConfig};
pub use event::{
    Event, MINT_INFO_KIND, REVIEW_KIND, Tag, parse_metadata_event, parse_review_event,
};
pub use fetch::FetchResult;
pub use metadata::MetadataRecord;
pub use recommendation::{ExportData, ExportedReview, ExportedReviews, Recommendation, Stats};
pub use review::Review;
