use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Contributor, Place, Review, User};

/// Untyped rows of the four catalog relations, as fetched from the store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCatalog {
    #[serde(default, alias = "restaurants")]
    pub places: Vec<Value>,
    #[serde(default)]
    pub reviews: Vec<Value>,
    #[serde(default, alias = "reviewers")]
    pub contributors: Vec<Value>,
    #[serde(default)]
    pub users: Vec<Value>,
}

impl RawCatalog {
    pub fn row_count(&self) -> usize {
        self.places.len() + self.reviews.len() + self.contributors.len() + self.users.len()
    }
}

/// Immutable point-in-time copy of the catalog
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Snapshot {
    pub places: Vec<Place>,
    pub reviews: Vec<Review>,
    pub contributors: Vec<Contributor>,
    pub users: Vec<User>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Coerces raw rows into typed relations
    ///
    /// Later rows repeating an id already seen are dropped. A place's
    /// `review_count` is recomputed from the reviews relation so that it always
    /// equals the sum of its rating histogram.
    pub fn from_raw(raw: &RawCatalog) -> Self {
        let reviews: Vec<Review> = raw.reviews.iter().map(Review::from_row).collect();

        let mut rated: HashMap<i64, i64> = HashMap::new();
        for review in &reviews {
            if review.rating_bin().is_some() {
                *rated.entry(review.place_id).or_insert(0) += 1;
            }
        }

        let places = dedup_by_id(raw.places.iter().map(Place::from_row), |p| p.id)
            .into_iter()
            .map(|mut place| {
                let counted = rated.get(&place.id).copied().unwrap_or(0);
                if place.review_count != counted {
                    tracing::debug!(
                        place_id = place.id,
                        stored = place.review_count,
                        counted,
                        "Reconciled place review_count with reviews"
                    );
                    place.review_count = counted;
                }
                place
            })
            .collect();

        Self {
            places,
            reviews,
            contributors: dedup_by_id(raw.contributors.iter().map(Contributor::from_row), |c| c.id),
            users: dedup_by_id(raw.users.iter().map(User::from_row), |u| u.id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
            && self.reviews.is_empty()
            && self.contributors.is_empty()
            && self.users.is_empty()
    }

    pub fn place(&self, id: i64) -> Option<&Place> {
        self.places.iter().find(|p| p.id == id)
    }

    pub fn contributor(&self, id: i64) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.id == id)
    }

    /// Resolves a review's author. The first contributor carrying the name wins.
    pub fn contributor_by_name(&self, name: &str) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.name == name)
    }

    pub fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn reviews_for_place(&self, place_id: i64) -> impl Iterator<Item = &Review> {
        self.reviews.iter().filter(move |r| r.place_id == place_id)
    }

    pub fn reviews_by(&self, contributor_name: &str) -> impl Iterator<Item = &Review> + '_ {
        let name = contributor_name.to_string();
        self.reviews
            .iter()
            .filter(move |r| r.contributor_name == name)
    }
}

fn dedup_by_id<T>(items: impl Iterator<Item = T>, id: impl Fn(&T) -> i64) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .filter(|item| {
            let fresh = seen.insert(id(item));
            if !fresh {
                tracing::debug!(id = id(item), "Dropped duplicate catalog row");
            }
            fresh
        })
        .collect()
}
