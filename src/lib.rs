// src/lib.rs

//! Cashu mint discovery library
//!
//! Aggregates mint announcements and reviews published as events, fetches
//! each mint's `/v1/info` document and ranks mints by review count and
//! average rating.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod source;
pub mod storage;
pub mod utils;

pub use error::{AppError, Result};
pub use pipeline::{DiscoverOptions, MintDiscovery};
