use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coerce::Row;

/// One review of a place
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: i64,
    pub place_id: i64,
    /// Display name of the author; a weak reference into the contributors relation
    pub contributor_name: String,
    /// 1-5 for well-formed records, 0 when the stored rating could not be read
    pub rating: i64,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Review {
    pub fn from_row(value: &Value) -> Self {
        let row = Row::new("reviews", value);
        Self {
            id: row.int(&["id", "review_id"]),
            place_id: row.int(&["restaurant_id", "place_id"]),
            contributor_name: row.text(&["reviewer_name", "contributor_name"]),
            rating: row.int(&["rating"]),
            content: row.text(&["content"]),
            timestamp: row.timestamp(&["timestamp"]),
        }
    }

    /// Histogram bin for this rating, 5 stars first; `None` outside 1..=5
    pub fn rating_bin(&self) -> Option<usize> {
        (1..=5)
            .contains(&self.rating)
            .then(|| (5 - self.rating) as usize)
    }
}
