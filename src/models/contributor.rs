use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coerce::Row;

/// Someone who writes reviews
///
/// Reviews point back at a contributor through `name`, not `id`. Two
/// contributors sharing a display name therefore share their reviews.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contributor {
    pub id: i64,
    pub name: String,
    pub total_reviews: i64,
    pub followers: i64,
}

impl Contributor {
    pub fn from_row(value: &Value) -> Self {
        let row = Row::new("contributors", value);
        Self {
            id: row.int(&["reviewer_id", "contributor_id", "id"]),
            name: row.text(&["name"]),
            total_reviews: row.int(&["total_reviews"]),
            followers: row.int(&["followers"]),
        }
    }
}
