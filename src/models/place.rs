use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coerce::Row;

/// A reviewed venue in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub average_rating: f64,
    /// Number of reviews in the snapshot carrying a 1-5 rating
    pub review_count: i64,
    /// Keyword tags, in the order the store lists them
    pub keywords: Vec<String>,
}

impl Place {
    pub fn from_row(value: &Value) -> Self {
        let row = Row::new("places", value);
        Self {
            id: row.int(&["id", "restaurant_id", "place_id"]),
            name: row.text(&["name"]),
            average_rating: row.float(&["average_rating"]),
            review_count: row.int(&["review_count"]),
            keywords: row.tags(&["keywords"]),
        }
    }

    /// Case-insensitive match against the name or any keyword
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self
                .keywords
                .iter()
                .any(|kw| kw.to_lowercase().contains(&needle))
    }
}
