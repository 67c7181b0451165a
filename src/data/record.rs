//! The review record in its raw and normalized shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A loosely-typed record as parsed from the source file: `Key: Value`
/// pairs with the original `review/...` key names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Append a continuation line to the review text, space-joined.
    pub fn append_review_text(&mut self, line: &str) {
        let text = self.fields.entry("review/text".to_string()).or_default();
        if text.is_empty() {
            text.push_str(line);
        } else {
            text.push(' ');
            text.push_str(line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The canonical field set consumed by both backends. Identity is
/// backend-assigned (SERIAL integer or ObjectId) and not part of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub product_id: String,
    pub user_id: String,
    pub profile_name: String,
    pub helpfulness: String,
    pub score: f64,
    pub review_time: i64,
    pub summary: String,
    pub review_text: String,
}

impl Review {
    /// Normalize a raw record: missing text fields become empty strings,
    /// unparseable score/time become zero.
    pub fn normalize(raw: &RawRecord) -> Self {
        let text = |key: &str| raw.get(key).unwrap_or_default().to_string();
        Review {
            product_id: text("product/productId"),
            user_id: text("review/userId"),
            profile_name: text("review/profileName"),
            helpfulness: text("review/helpfulness"),
            score: raw
                .get("review/score")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
            review_time: raw
                .get("review/time")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            summary: text("review/summary"),
            review_text: text("review/text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawRecord {
        let mut raw = RawRecord::new();
        raw.insert("product/productId", "B003AI2VGA");
        raw.insert("review/userId", "A141HP4LYPWMSR");
        raw.insert("review/profileName", "Brian E. Erland");
        raw.insert("review/helpfulness", "7/7");
        raw.insert("review/score", "3.0");
        raw.insert("review/time", "1182729600");
        raw.insert("review/summary", "\"There Is So Much Darkness Now\"");
        raw.insert("review/text", "Synopsis: On the daily trek...");
        raw
    }

    #[test]
    fn normalizes_all_fields() {
        let review = Review::normalize(&sample_raw());
        assert_eq!(review.product_id, "B003AI2VGA");
        assert_eq!(review.user_id, "A141HP4LYPWMSR");
        assert_eq!(review.profile_name, "Brian E. Erland");
        assert_eq!(review.helpfulness, "7/7");
        assert_eq!(review.score, 3.0);
        assert_eq!(review.review_time, 1182729600);
        assert_eq!(review.summary, "\"There Is So Much Darkness Now\"");
        assert_eq!(review.review_text, "Synopsis: On the daily trek...");
    }

    #[test]
    fn missing_fields_default_to_empty_and_zero() {
        let review = Review::normalize(&RawRecord::new());
        assert_eq!(review.product_id, "");
        assert_eq!(review.score, 0.0);
        assert_eq!(review.review_time, 0);
    }

    #[test]
    fn unparseable_numbers_default_to_zero() {
        let mut raw = RawRecord::new();
        raw.insert("review/score", "not-a-number");
        raw.insert("review/time", "3.5");
        let review = Review::normalize(&raw);
        assert_eq!(review.score, 0.0);
        assert_eq!(review.review_time, 0);
    }

    #[test]
    fn bson_round_trip_preserves_every_field() {
        let review = Review::normalize(&sample_raw());
        let doc = bson::to_document(&review).unwrap();
        let back: Review = bson::from_document(doc).unwrap();
        assert_eq!(back, review);
    }
}
