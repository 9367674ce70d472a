//! Listing and detail queries over a catalog snapshot.
//!
//! These are plain functions of a [`Snapshot`]; they never touch the store.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Contributor, Place, Review, Snapshot, User};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaceSort {
    #[default]
    None,
    MostReviews,
    FewestReviews,
    HighestRated,
    LowestRated,
}

/// Filters for the place listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceQuery {
    /// Substring of the name or of any keyword
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub min_rating: f64,
    #[serde(default)]
    pub min_reviews: i64,
    #[serde(default)]
    pub sort: PlaceSort,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContributorSort {
    TotalReviews,
    DistinctPlaces,
    #[default]
    Followers,
}

/// Filters for the contributor listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContributorQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub min_reviews: i64,
    #[serde(default)]
    pub min_followers: i64,
    /// Keep only contributors who reviewed some place more than once
    #[serde(default)]
    pub has_revisit: bool,
    #[serde(default)]
    pub sort: ContributorSort,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContributorSummary {
    #[serde(flatten)]
    pub contributor: Contributor,
    pub distinct_places_visited: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RatingBucket {
    pub rating: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyRating {
    /// `YYYY-MM`
    pub month: String,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaceReview {
    #[serde(flatten)]
    pub review: Review,
    /// Author resolved through the display name, when a contributor carries it
    pub contributor_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaceDetail {
    pub place: Place,
    pub reviews: Vec<PlaceReview>,
    pub rating_distribution: Vec<RatingBucket>,
    pub monthly_ratings: Vec<MonthlyRating>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContributorReview {
    #[serde(flatten)]
    pub review: Review,
    pub place_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RevisitedPlace {
    pub place_id: i64,
    pub visit_count: usize,
    pub last_visit: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContributorDetail {
    pub contributor: Contributor,
    pub reviews: Vec<ContributorReview>,
    pub average_rating_given: f64,
    pub revisited: Vec<RevisitedPlace>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DirectoryEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    pub user: User,
    pub following: Vec<Contributor>,
}

pub fn search_places(snapshot: &Snapshot, query: &PlaceQuery) -> Vec<Place> {
    let needle = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let mut places: Vec<Place> = snapshot
        .places
        .iter()
        .filter(|p| p.average_rating >= query.min_rating && p.review_count >= query.min_reviews)
        .filter(|p| needle.map_or(true, |q| p.matches_text(q)))
        .cloned()
        .collect();

    match query.sort {
        PlaceSort::None => {}
        PlaceSort::MostReviews => places.sort_by(|a, b| b.review_count.cmp(&a.review_count)),
        PlaceSort::FewestReviews => places.sort_by(|a, b| a.review_count.cmp(&b.review_count)),
        PlaceSort::HighestRated => {
            places.sort_by(|a, b| b.average_rating.total_cmp(&a.average_rating))
        }
        PlaceSort::LowestRated => {
            places.sort_by(|a, b| a.average_rating.total_cmp(&b.average_rating))
        }
    }
    places
}

pub fn search_contributors(snapshot: &Snapshot, query: &ContributorQuery) -> Vec<ContributorSummary> {
    let needle = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let mut visited: HashMap<&str, HashSet<i64>> = HashMap::new();
    let mut visits: HashMap<(&str, i64), usize> = HashMap::new();
    for review in &snapshot.reviews {
        let name = review.contributor_name.as_str();
        visited.entry(name).or_default().insert(review.place_id);
        *visits.entry((name, review.place_id)).or_insert(0) += 1;
    }
    let revisitors: HashSet<&str> = visits
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|((name, _), _)| *name)
        .collect();

    let mut rows: Vec<ContributorSummary> = snapshot
        .contributors
        .iter()
        .filter(|c| {
            needle
                .as_deref()
                .map_or(true, |q| c.name.to_lowercase().contains(q))
        })
        .filter(|c| c.total_reviews >= query.min_reviews && c.followers >= query.min_followers)
        .filter(|c| !query.has_revisit || revisitors.contains(c.name.as_str()))
        .map(|c| ContributorSummary {
            contributor: c.clone(),
            distinct_places_visited: visited.get(c.name.as_str()).map_or(0, HashSet::len),
        })
        .collect();

    match query.sort {
        ContributorSort::TotalReviews => rows.sort_by(|a, b| {
            b.contributor.total_reviews.cmp(&a.contributor.total_reviews)
        }),
        ContributorSort::DistinctPlaces => {
            rows.sort_by(|a, b| b.distinct_places_visited.cmp(&a.distinct_places_visited))
        }
        ContributorSort::Followers => {
            rows.sort_by(|a, b| b.contributor.followers.cmp(&a.contributor.followers))
        }
    }
    rows
}

pub fn place_detail(snapshot: &Snapshot, place_id: i64) -> Option<PlaceDetail> {
    let place = snapshot.place(place_id)?.clone();

    let mut reviews: Vec<PlaceReview> = snapshot
        .reviews_for_place(place_id)
        .map(|review| PlaceReview {
            review: review.clone(),
            contributor_id: snapshot
                .contributor_by_name(&review.contributor_name)
                .map(|c| c.id),
        })
        .collect();
    reviews.sort_by(|a, b| b.review.timestamp.cmp(&a.review.timestamp));

    let mut counts = [0usize; 5];
    for review in snapshot.reviews_for_place(place_id) {
        if let Some(bin) = review.rating_bin() {
            counts[bin] += 1;
        }
    }
    let rating_distribution = counts
        .iter()
        .enumerate()
        .map(|(bin, &count)| RatingBucket {
            rating: 5 - bin as i64,
            count,
        })
        .collect();

    Some(PlaceDetail {
        place,
        reviews,
        rating_distribution,
        monthly_ratings: monthly_ratings(snapshot.reviews_for_place(place_id)),
    })
}

/// Average rating per calendar month; reviews without a timestamp are left out
pub fn monthly_ratings<'a>(reviews: impl Iterator<Item = &'a Review>) -> Vec<MonthlyRating> {
    let mut months: BTreeMap<String, (i64, usize)> = BTreeMap::new();
    for review in reviews {
        let Some(ts) = review.timestamp else {
            continue;
        };
        let entry = months.entry(ts.format("%Y-%m").to_string()).or_insert((0, 0));
        entry.0 += review.rating;
        entry.1 += 1;
    }

    months
        .into_iter()
        .map(|(month, (sum, count))| MonthlyRating {
            month,
            average_rating: sum as f64 / count as f64,
        })
        .collect()
}

pub fn contributor_detail(snapshot: &Snapshot, contributor_id: i64) -> Option<ContributorDetail> {
    let contributor = snapshot.contributor(contributor_id)?.clone();
    let authored: Vec<&Review> = snapshot.reviews_by(&contributor.name).collect();

    let mut reviews: Vec<ContributorReview> = authored
        .iter()
        .filter_map(|review| {
            snapshot.place(review.place_id).map(|place| ContributorReview {
                review: (*review).clone(),
                place_name: place.name.clone(),
            })
        })
        .collect();
    reviews.sort_by(|a, b| b.review.timestamp.cmp(&a.review.timestamp));

    let rated: Vec<i64> = authored
        .iter()
        .filter(|r| r.rating_bin().is_some())
        .map(|r| r.rating)
        .collect();
    let average_rating_given = if rated.is_empty() {
        0.0
    } else {
        rated.iter().sum::<i64>() as f64 / rated.len() as f64
    };

    let mut per_place: BTreeMap<i64, (usize, Option<DateTime<Utc>>)> = BTreeMap::new();
    for review in &authored {
        let entry = per_place.entry(review.place_id).or_insert((0, None));
        entry.0 += 1;
        entry.1 = entry.1.max(review.timestamp);
    }
    let mut revisited: Vec<RevisitedPlace> = per_place
        .into_iter()
        .filter(|(_, (count, _))| *count > 1)
        .map(|(place_id, (visit_count, last_visit))| {
            let place = snapshot.place(place_id);
            RevisitedPlace {
                place_id,
                visit_count,
                last_visit,
                name: place.map(|p| p.name.clone()),
                average_rating: place.map(|p| p.average_rating),
            }
        })
        .collect();
    revisited.sort_by(|a, b| b.visit_count.cmp(&a.visit_count));

    Some(ContributorDetail {
        contributor,
        reviews,
        average_rating_given,
        revisited,
    })
}

pub fn place_directory(snapshot: &Snapshot) -> Vec<DirectoryEntry> {
    let mut entries: Vec<DirectoryEntry> = snapshot
        .places
        .iter()
        .map(|p| DirectoryEntry {
            id: p.id,
            name: p.name.clone(),
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    entries
}

pub fn user_profile(snapshot: &Snapshot, user_id: i64) -> Option<UserProfile> {
    let user = snapshot.user(user_id)?.clone();
    let following = user
        .followed
        .iter()
        .filter_map(|id| snapshot.contributor(*id).cloned())
        .collect();
    Some(UserProfile { user, following })
}
