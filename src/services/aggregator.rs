//! In-memory aggregation of reviews, metadata and fetch results.
//!
//! All three stores are keyed by mint url. The aggregator holds no locks;
//! callers sharing it across tasks must serialize access.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::models::{
    ExportData, ExportedReview, ExportedReviews, FetchResult, MetadataRecord, Recommendation,
    Review, Stats,
};

/// Merges review, metadata and fetch streams into ranked recommendations.
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    reviews_by_url: HashMap<String, Vec<Review>>,
    metadata_by_url: HashMap<String, MetadataRecord>,
    fetch_by_url: HashMap<String, FetchResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a review, keeping only the latest review per author per mint.
    ///
    /// Returns `false` when the review was ignored: missing url or event id,
    /// an event already stored for this url, or an older review than the one
    /// held for the same author. Equal timestamps resolve to the newest write.
    pub fn add_review(&mut self, review: Review) -> bool {
        if review.url.is_empty() || review.event_id.is_empty() {
            return false;
        }

        let reviews = self.reviews_by_url.entry(review.url.clone()).or_default();
        if reviews.iter().any(|r| {
            r.event_id == review.event_id
                || (r.pubkey == review.pubkey && r.created_at > review.created_at)
        }) {
            return false;
        }

        reviews.retain(|r| r.pubkey != review.pubkey);
        reviews.push(review);
        // Stable sort: equal timestamps keep insertion order.
        reviews.sort_by_key(|r| r.created_at);
        true
    }

    /// Add several reviews. Returns how many were stored.
    pub fn add_reviews<I>(&mut self, reviews: I) -> usize
    where
        I: IntoIterator<Item = Review>,
    {
        reviews
            .into_iter()
            .map(|review| self.add_review(review))
            .filter(|added| *added)
            .count()
    }

    /// Store a metadata record if it is newer than the one held for its url.
    pub fn add_metadata(&mut self, record: MetadataRecord) -> bool {
        if record.url.is_empty() {
            return false;
        }

        match self.metadata_by_url.get(&record.url) {
            Some(existing) if record.created_at <= existing.created_at => false,
            _ => {
                self.metadata_by_url.insert(record.url.clone(), record);
                true
            }
        }
    }

    /// Add several metadata records. Returns how many replaced or created an entry.
    pub fn add_metadata_batch<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = MetadataRecord>,
    {
        records
            .into_iter()
            .map(|record| self.add_metadata(record))
            .filter(|added| *added)
            .count()
    }

    /// Record the latest fetch result for a mint, replacing any previous one.
    pub fn set_fetch_result(&mut self, url: &str, result: FetchResult) {
        if url.is_empty() {
            return;
        }
        self.fetch_by_url.insert(url.to_string(), result);
    }

    /// Record several fetch results, each under its own url.
    pub fn set_fetch_results<I>(&mut self, results: I)
    where
        I: IntoIterator<Item = FetchResult>,
    {
        for result in results {
            let url = result.url.clone();
            self.set_fetch_result(&url, result);
        }
    }

    /// Every url present in any store, in lexical order.
    pub fn all_known_urls(&self) -> Vec<String> {
        self.reviews_by_url
            .keys()
            .chain(self.metadata_by_url.keys())
            .chain(self.fetch_by_url.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Reviews for a mint, oldest first.
    pub fn reviews_for_url(&self, url: &str) -> &[Review] {
        self.reviews_by_url
            .get(url)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Metadata record held for a mint.
    pub fn metadata_for_url(&self, url: &str) -> Option<&MetadataRecord> {
        self.metadata_by_url.get(url)
    }

    /// Latest fetch result held for a mint.
    pub fn fetch_result_for_url(&self, url: &str) -> Option<&FetchResult> {
        self.fetch_by_url.get(url)
    }

    /// Recommendation for a single mint, `None` if the url is unknown.
    pub fn recommendation(&self, url: &str) -> Option<Recommendation> {
        let reviews = self.reviews_for_url(url);
        let fetch = self.fetch_by_url.get(url);

        if reviews.is_empty() && !self.metadata_by_url.contains_key(url) && fetch.is_none() {
            return None;
        }

        Some(Recommendation {
            url: url.to_string(),
            reviews_count: reviews.len(),
            average_rating: average_rating(reviews),
            info: fetch.and_then(|f| f.info.clone()),
            error: fetch.is_some_and(|f| f.error),
            last_http_info_fetch_at: fetch.and_then(FetchResult::fetch_time),
        })
    }

    /// Recommendations for every known mint, best first.
    ///
    /// Ordered by review count, then average rating (absent ranks as 0),
    /// then url.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut recommendations: Vec<_> = self
            .all_known_urls()
            .iter()
            .filter_map(|url| self.recommendation(url))
            .collect();
        recommendations.sort_by(compare_recommendations);
        recommendations
    }

    /// Counts over the stores.
    pub fn stats(&self) -> Stats {
        Stats {
            mint_count: self.all_known_urls().len(),
            total_reviews: self.reviews_by_url.values().map(Vec::len).sum(),
            mints_with_reviews: self.reviews_by_url.len(),
            mints_with_metadata: self.metadata_by_url.len(),
            mints_with_fetch_result: self.fetch_by_url.len(),
        }
    }

    /// Snapshot reviews and fetch results. Source events are not exported.
    pub fn export(&self) -> ExportData {
        let mut reviews: Vec<ExportedReviews> = self
            .reviews_by_url
            .iter()
            .map(|(url, reviews)| ExportedReviews {
                url: url.clone(),
                reviews: reviews.iter().map(ExportedReview::from).collect(),
            })
            .collect();
        reviews.sort_by(|a, b| a.url.cmp(&b.url));

        let mut http_info: Vec<FetchResult> = self
            .fetch_by_url
            .iter()
            .map(|(url, result)| FetchResult {
                url: url.clone(),
                ..result.clone()
            })
            .collect();
        http_info.sort_by(|a, b| a.url.cmp(&b.url));

        ExportData { reviews, http_info }
    }

    /// Replay an export through the regular ingestion paths.
    pub fn import(&mut self, data: ExportData) {
        for group in data.reviews {
            for review in group.reviews {
                self.add_review(review.into_review(&group.url));
            }
        }

        for result in data.http_info {
            if !result.url.is_empty() {
                let url = result.url.clone();
                self.set_fetch_result(&url, result);
            }
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.reviews_by_url.clear();
        self.metadata_by_url.clear();
        self.fetch_by_url.clear();
    }
}

fn average_rating(reviews: &[Review]) -> Option<f64> {
    let ratings: Vec<i32> = reviews.iter().filter_map(Review::valid_rating).collect();
    if ratings.is_empty() {
        return None;
    }
    let sum: i32 = ratings.iter().sum();
    Some(f64::from(sum) / ratings.len() as f64)
}

fn compare_recommendations(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.reviews_count
        .cmp(&a.reviews_count)
        .then_with(|| b.ranking_rating().total_cmp(&a.ranking_rating()))
        .then_with(|| a.url.cmp(&b.url))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn review(url: &str, event_id: &str, pubkey: &str, created_at: u64, rating: Option<i32>) -> Review {
        Review {
            event_id: event_id.to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            rating,
            comment: format!("comment {event_id}"),
            url: url.to_string(),
            raw: None,
        }
    }

    fn metadata(url: &str, created_at: u64, name: &str) -> MetadataRecord {
        MetadataRecord {
            url: url.to_string(),
            pubkey: "operator".to_string(),
            discriminator: String::new(),
            content: Some(json!({ "name": name })),
            created_at,
            raw: None,
        }
    }

    fn fetched(url: &str, fetched_at: i64, error: bool) -> FetchResult {
        FetchResult {
            url: url.to_string(),
            info: (!error).then(|| json!({ "name": url })),
            error,
            fetched_at,
        }
    }

    const A: &str = "https://a.example.com";
    const B: &str = "https://b.example.com";
    const C: &str = "https://c.example.com";

    #[test]
    fn test_latest_review_per_author_wins_in_either_order() {
        let older = review(A, "e1", "alice", 100, Some(2));
        let newer = review(A, "e2", "alice", 200, Some(5));

        let mut forward = Aggregator::new();
        forward.add_review(older.clone());
        forward.add_review(newer.clone());

        let mut backward = Aggregator::new();
        backward.add_review(newer.clone());
        backward.add_review(older.clone());

        assert_eq!(forward.reviews_for_url(A), std::slice::from_ref(&newer));
        assert_eq!(backward.reviews_for_url(A), std::slice::from_ref(&newer));
    }

    #[test]
    fn test_equal_timestamps_last_write_wins() {
        let mut agg = Aggregator::new();
        agg.add_review(review(A, "e1", "alice", 100, Some(1)));
        agg.add_review(review(A, "e2", "alice", 100, Some(5)));

        let stored = agg.reviews_for_url(A);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_id, "e2");
    }

    #[test]
    fn test_duplicate_event_is_ignored() {
        let mut agg = Aggregator::new();
        assert!(agg.add_review(review(A, "e1", "alice", 100, Some(4))));
        assert!(!agg.add_review(review(A, "e1", "alice", 100, Some(4))));
        assert!(!agg.add_review(review(A, "e1", "bob", 300, Some(1))));
        assert_eq!(agg.reviews_for_url(A).len(), 1);
    }

    #[test]
    fn test_same_event_on_different_urls() {
        let mut agg = Aggregator::new();
        agg.add_review(review(A, "e1", "alice", 100, Some(4)));
        agg.add_review(review(B, "e1", "alice", 100, Some(4)));
        assert_eq!(agg.stats().total_reviews, 2);
    }

    #[test]
    fn test_reviews_sorted_by_created_at() {
        let mut agg = Aggregator::new();
        agg.add_reviews(vec![
            review(A, "e3", "carol", 300, None),
            review(A, "e1", "alice", 100, None),
            review(A, "e2", "bob", 200, None),
        ]);

        let order: Vec<_> = agg.reviews_for_url(A).iter().map(|r| r.created_at).collect();
        assert_eq!(order, vec![100, 200, 300]);
    }

    #[test]
    fn test_invalid_reviews_are_dropped() {
        let mut agg = Aggregator::new();
        assert!(!agg.add_review(review("", "e1", "alice", 1, Some(5))));
        assert!(!agg.add_review(review(A, "", "alice", 1, Some(5))));
        assert_eq!(agg.stats(), Stats::default());
    }

    #[test]
    fn test_metadata_replaced_only_by_newer() {
        let mut agg = Aggregator::new();
        assert!(agg.add_metadata(metadata(A, 200, "second")));
        assert!(!agg.add_metadata(metadata(A, 100, "first")));
        assert!(!agg.add_metadata(metadata(A, 200, "same age")));
        assert_eq!(
            agg.metadata_for_url(A).unwrap().content,
            Some(json!({ "name": "second" }))
        );

        assert!(agg.add_metadata(metadata(A, 300, "third")));
        assert_eq!(agg.metadata_for_url(A).unwrap().created_at, 300);
        assert!(!agg.add_metadata(metadata("", 500, "no url")));
    }

    #[test]
    fn test_fetch_result_overwrites_unconditionally() {
        let mut agg = Aggregator::new();
        agg.set_fetch_result(A, fetched(A, 500, false));
        agg.set_fetch_result(A, fetched(A, 100, true));

        let stored = agg.fetch_result_for_url(A).unwrap();
        assert_eq!(stored.fetched_at, 100);
        assert!(stored.error);
    }

    #[test]
    fn test_all_known_urls_is_union() {
        let mut agg = Aggregator::new();
        agg.add_review(review(A, "e1", "alice", 1, None));
        agg.add_metadata(metadata(B, 1, "b"));
        agg.set_fetch_result(C, fetched(C, 1, true));
        agg.set_fetch_result(A, fetched(A, 1, false));

        assert_eq!(agg.all_known_urls(), vec![A, B, C]);
    }

    #[test]
    fn test_recommendation_average_excludes_invalid_ratings() {
        let mut agg = Aggregator::new();
        agg.add_reviews(vec![
            review(A, "e1", "alice", 1, Some(5)),
            review(A, "e2", "bob", 2, Some(2)),
            review(A, "e3", "carol", 3, Some(9)),
            review(A, "e4", "dave", 4, None),
            review(B, "e5", "alice", 5, None),
            review(B, "e6", "bob", 6, Some(0)),
        ]);

        let a = agg.recommendation(A).unwrap();
        assert_eq!(a.reviews_count, 4);
        assert_eq!(a.average_rating, Some(3.5));

        let b = agg.recommendation(B).unwrap();
        assert_eq!(b.reviews_count, 2);
        assert_eq!(b.average_rating, None);
    }

    #[test]
    fn test_recommendation_fetch_fields() {
        let mut agg = Aggregator::new();
        assert!(agg.recommendation(A).is_none());

        agg.add_metadata(metadata(A, 1, "a"));
        let bare = agg.recommendation(A).unwrap();
        assert_eq!(bare.reviews_count, 0);
        assert!(bare.info.is_none());
        assert!(!bare.error);
        assert!(bare.last_http_info_fetch_at.is_none());

        agg.set_fetch_result(A, fetched(A, 1_700_000_000, false));
        let with_fetch = agg.recommendation(A).unwrap();
        assert_eq!(with_fetch.info, Some(json!({ "name": A })));
        assert_eq!(with_fetch.last_http_info_fetch_at, Some(1_700_000_000));
    }

    #[test]
    fn test_recommendations_sorted() {
        let mut agg = Aggregator::new();
        // C: two reviews, avg 3
        agg.add_review(review(C, "c1", "alice", 1, Some(3)));
        agg.add_review(review(C, "c2", "bob", 2, Some(3)));
        // A: two reviews, avg 4.5
        agg.add_review(review(A, "a1", "alice", 1, Some(4)));
        agg.add_review(review(A, "a2", "bob", 2, Some(5)));
        // B: one review, no rating
        agg.add_review(review(B, "b1", "alice", 1, None));
        // D and E: metadata only, tie broken by url
        agg.add_metadata(metadata("https://e.example.com", 1, "e"));
        agg.add_metadata(metadata("https://d.example.com", 1, "d"));

        let urls: Vec<_> = agg.recommendations().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![A, C, B, "https://d.example.com", "https://e.example.com"]
        );

        let recs = agg.recommendations();
        for pair in recs.windows(2) {
            assert!(pair[0].reviews_count >= pair[1].reviews_count);
            if pair[0].reviews_count == pair[1].reviews_count {
                assert!(pair[0].ranking_rating() >= pair[1].ranking_rating());
            }
        }
        assert_eq!(recs[2].average_rating, None);
    }

    #[test]
    fn test_stats() {
        let mut agg = Aggregator::new();
        agg.add_review(review(A, "e1", "alice", 1, Some(5)));
        agg.add_review(review(A, "e2", "bob", 1, Some(5)));
        agg.add_metadata(metadata(B, 1, "b"));
        agg.set_fetch_result(B, fetched(B, 1, false));

        assert_eq!(
            agg.stats(),
            Stats {
                mint_count: 2,
                total_reviews: 2,
                mints_with_reviews: 1,
                mints_with_metadata: 1,
                mints_with_fetch_result: 1,
            }
        );
    }

    #[test]
    fn test_import_drops_malformed_entries() {
        let json = r#"{
            "reviews": [
                {
                    "url": "https://a.example.com",
                    "reviews": [
                        {"pubkey": "x", "created_at": 1, "rating": 3, "comment": "no id"},
                        {"eventId": "e1", "pubkey": "y", "created_at": 2, "rating": 5, "comment": "ok"}
                    ]
                },
                {"reviews": [{"eventId": "e2", "pubkey": "z", "created_at": 3}]}
            ],
            "httpInfo": [
                {"info": {"name": "nameless"}, "error": false, "fetchedAt": 5},
                {"url": "https://a.example.com", "info": null, "error": true, "fetchedAt": 6}
            ]
        }"#;
        let data: ExportData = serde_json::from_str(json).unwrap();

        let mut agg = Aggregator::new();
        agg.import(data);

        let reviews = agg.reviews_for_url(A);
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].event_id, "e1");
        assert_eq!(agg.all_known_urls(), vec![A]);
        assert!(agg.fetch_result_for_url(A).unwrap().error);
    }

    #[test]
    fn test_export_clear_import_round_trip() {
        let mut agg = Aggregator::new();
        let mut with_raw = review(A, "e1", "alice", 10, Some(4));
        with_raw.raw = Some(crate::models::Event {
            id: "e1".into(),
            pubkey: "alice".into(),
            kind: crate::models::REVIEW_KIND,
            created_at: 10,
            tags: Vec::new(),
            content: "[4/5]".into(),
            sig: String::new(),
        });
        agg.add_review(with_raw);
        agg.add_review(review(A, "e2", "bob", 20, Some(2)));
        agg.add_review(review(B, "e3", "carol", 30, None));
        agg.set_fetch_result(A, fetched(A, 1_700_000_000, false));
        agg.set_fetch_result(C, fetched(C, 1_700_000_100, true));

        let before = agg.recommendations();
        let exported = agg.export();
        assert!(exported.reviews.iter().all(|g| !g.url.is_empty()));

        // Survives a JSON round trip as well.
        let json = serde_json::to_string(&exported).unwrap();
        assert!(!json.contains("raw"));
        let exported: ExportData = serde_json::from_str(&json).unwrap();

        agg.clear();
        assert!(agg.recommendations().is_empty());

        let mut fresh = Aggregator::new();
        fresh.import(exported.clone());
        assert_eq!(fresh.recommendations(), before);

        // Importing twice changes nothing.
        fresh.import(exported);
        assert_eq!(fresh.recommendations(), before);
    }
}
