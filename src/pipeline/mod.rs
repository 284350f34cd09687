//! Discovery pipeline.
//!
//! - `MintDiscovery::discover`: one full ingest, refresh and rank cycle
//! - `MintDiscovery::subscribe`: live ingestion of newly published events

pub mod discovery;
pub mod live;
pub mod progress;

pub use discovery::{ConfigUpdate, DiscoverOptions, MintDiscovery, Settings};
pub use live::{LiveCallbacks, LiveSubscription};
pub use progress::{Progress, ProgressCallback};
