//! Progress reporting for discovery runs.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Phase boundary reached during [`discover`](super::MintDiscovery::discover).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Querying mint metadata events
    MintInfo,
    /// Querying review events
    Reviews,
    /// Fetching `/v1/info` for `total` stale mints
    Fetching { total: usize },
    /// One fetch finished
    Fetched { url: String, error: bool },
    /// Run complete
    Done,
}

impl Progress {
    pub fn phase(&self) -> &'static str {
        match self {
            Progress::MintInfo | Progress::Reviews => "nostr",
            Progress::Fetching { .. } | Progress::Fetched { .. } => "http",
            Progress::Done => "done",
        }
    }

    pub fn step(&self) -> Option<&'static str> {
        match self {
            Progress::MintInfo => Some("mint-info"),
            Progress::Reviews => Some("reviews"),
            Progress::Fetching { .. } => Some("fetching"),
            Progress::Fetched { .. } => Some("fetched"),
            Progress::Done => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step() {
            Some(step) => write!(f, "{}/{}", self.phase(), step),
            None => f.write_str(self.phase()),
        }
    }
}

/// Callback receiving progress updates.
pub type ProgressCallback<'a> = &'a (dyn Fn(&Progress) + Send + Sync);

/// Deliver a progress update, containing any panic raised by the callback.
pub(crate) fn report(callback: Option<ProgressCallback<'_>>, progress: &Progress) {
    let Some(callback) = callback else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| callback(progress))).is_err() {
        log::warn!("Progress callback panicked at {}", progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(Progress::MintInfo.to_string(), "nostr/mint-info");
        assert_eq!(Progress::Reviews.to_string(), "nostr/reviews");
        assert_eq!(Progress::Fetching { total: 3 }.to_string(), "http/fetching");
        let fetched = Progress::Fetched {
            url: "https://a.com".into(),
            error: false,
        };
        assert_eq!(fetched.to_string(), "http/fetched");
        assert_eq!(Progress::Done.to_string(), "done");
    }

    #[test]
    fn test_report_contains_panics() {
        fn explode(_: &Progress) {
            panic!("boom");
        }
        report(Some(&explode), &Progress::Done);
        report(None, &Progress::Done);
    }
}
