//! Review content parser.
//!
//! Reviews carry their rating as a `[N/5]` prefix followed by a free-text
//! comment, e.g. `[4/5] Fast and reliable`.

use std::sync::OnceLock;

use regex::Regex;

/// Rating and comment extracted from review content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedReview {
    pub rating: Option<i32>,
    pub comment: String,
}

fn rating_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\s*\[(\d)\s*/\s*5\]\s*(.*)$").expect("rating pattern is valid")
    })
}

/// Parse a rating and comment from review content.
///
/// Content without a tag becomes the (trimmed) comment. A tag with a digit
/// outside 1..=5 yields no rating but keeps the remainder as the comment.
pub fn parse_rating_and_comment(content: &str) -> ParsedReview {
    if content.is_empty() {
        return ParsedReview::default();
    }

    let Some(caps) = rating_pattern().captures(content) else {
        return ParsedReview {
            rating: None,
            comment: content.trim().to_string(),
        };
    };

    let comment = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let rating = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .filter(|r| (1..=5).contains(r));

    ParsedReview { rating, comment }
}
