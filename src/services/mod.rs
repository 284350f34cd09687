//! Service layer for mint discovery.
//!
//! This module contains the core logic for:
//! - Review content parsing (`parse_rating_and_comment`)
//! - Mint info fetching (`MintInfoFetcher`, `fetch_batch`, `is_fresh`)
//! - Aggregation and ranking (`Aggregator`)

mod aggregator;
mod fetcher;
mod review_parser;

pub use aggregator::Aggregator;
pub use fetcher::{
    BatchOptions, InfoFetcher, MintInfoFetcher, ResultCallback, fetch_batch, is_fresh, is_fresh_at,
};
pub use review_parser::{ParsedReview, parse_rating_and_comment};
