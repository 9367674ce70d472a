use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod coerce;
mod contributor;
mod place;
mod review;
mod snapshot;
mod user;

pub use contributor::Contributor;
pub use place::Place;
pub use review::Review;
pub use snapshot::{RawCatalog, Snapshot};
pub use user::User;

/// The two kinds of entity that can be ranked against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Place,
    Contributor,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Place => write!(f, "place"),
            EntityKind::Contributor => write!(f, "contributor"),
        }
    }
}

/// One neighbor returned by a similarity query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    pub id: i64,
    /// Cosine similarity in [0, 1]
    pub score: f64,
    /// 1-based position in the result list
    pub rank: usize,
}
