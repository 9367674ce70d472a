use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::coerce::Row;

/// An account holder and the contributors they follow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub followed: Vec<i64>,
}

impl User {
    pub fn from_row(value: &Value) -> Self {
        let row = Row::new("users", value);
        Self {
            id: row.int(&["id", "user_id"]),
            username: row.text(&["username"]),
            email: row.text(&["email"]),
            followed: row.id_list(&["followed_reviewers", "followed"]),
        }
    }

    pub fn follows(&self, contributor_id: i64) -> bool {
        self.followed.contains(&contributor_id)
    }
}
