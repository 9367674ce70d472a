use std::collections::BTreeMap;

use crate::models::{Review, Snapshot};

/// Number of leading rating-histogram columns (5 stars down to 1)
pub const HISTOGRAM_BINS: usize = 5;

/// Feature vectors for every entity of one kind in one snapshot generation
///
/// Row `i` belongs to `ids[i]`. Columns are the rating histogram followed by
/// one TF-IDF weight per `vocabulary` term, or a single zero column when the
/// vocabulary is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub ids: Vec<i64>,
    pub rows: Vec<Vec<f64>>,
    pub vocabulary: Vec<String>,
}

impl FeatureMatrix {
    pub fn dimension(&self) -> usize {
        HISTOGRAM_BINS + self.vocabulary.len().max(1)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn vector(&self, id: i64) -> Option<&[f64]> {
        self.ids
            .iter()
            .position(|&candidate| candidate == id)
            .map(|idx| self.rows[idx].as_slice())
    }
}

/// Places: rating histogram ++ TF-IDF over the names of who reviewed them
///
/// The term part is an identity co-occurrence signal: two places score as
/// similar when the same people review both.
pub fn build_place_vectors(snapshot: &Snapshot) -> FeatureMatrix {
    let mut slot: BTreeMap<i64, usize> = BTreeMap::new();
    for (idx, place) in snapshot.places.iter().enumerate() {
        slot.entry(place.id).or_insert(idx);
    }

    let mut histograms = vec![[0.0; HISTOGRAM_BINS]; snapshot.places.len()];
    let mut bags: Vec<Vec<String>> = vec![Vec::new(); snapshot.places.len()];

    for review in &snapshot.reviews {
        let Some(&idx) = slot.get(&review.place_id) else {
            continue;
        };
        count_rating(&mut histograms[idx], review);
        bags[idx].extend(tokenize(&review.contributor_name));
    }

    let ids = snapshot.places.iter().map(|p| p.id).collect();
    assemble(ids, histograms, &bags)
}

/// Contributors: "ratings given" histogram ++ TF-IDF over the place ids they reviewed
pub fn build_contributor_vectors(snapshot: &Snapshot) -> FeatureMatrix {
    let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, contributor) in snapshot.contributors.iter().enumerate() {
        by_name.entry(contributor.name.as_str()).or_default().push(idx);
    }

    let mut histograms = vec![[0.0; HISTOGRAM_BINS]; snapshot.contributors.len()];
    let mut bags: Vec<Vec<String>> = vec![Vec::new(); snapshot.contributors.len()];

    for review in &snapshot.reviews {
        let Some(owners) = by_name.get(review.contributor_name.as_str()) else {
            continue;
        };
        for &idx in owners {
            count_rating(&mut histograms[idx], review);
            bags[idx].push(review.place_id.to_string());
        }
    }

    let ids = snapshot.contributors.iter().map(|c| c.id).collect();
    assemble(ids, histograms, &bags)
}

fn count_rating(histogram: &mut [f64; HISTOGRAM_BINS], review: &Review) {
    if let Some(bin) = review.rating_bin() {
        histogram[bin] += 1.0;
    }
}

/// A display name becomes a lowercase token with every space replaced by an
/// underscore; other whitespace still separates tokens
fn tokenize(name: &str) -> Vec<String> {
    name.replace(' ', "_")
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

fn assemble(
    ids: Vec<i64>,
    histograms: Vec<[f64; HISTOGRAM_BINS]>,
    bags: &[Vec<String>],
) -> FeatureMatrix {
    let (vocabulary, weights) = tf_idf(bags);
    let rows = histograms
        .into_iter()
        .zip(weights)
        .map(|(histogram, terms)| {
            let mut row = Vec::with_capacity(HISTOGRAM_BINS + terms.len());
            row.extend_from_slice(&histogram);
            row.extend(terms);
            row
        })
        .collect();

    FeatureMatrix {
        ids,
        rows,
        vocabulary,
    }
}

/// Raw term counts times smoothed inverse document frequency
///
/// `idf(t) = ln((1 + n) / (1 + df(t))) + 1`. Rows are not length-normalized.
/// The vocabulary is sorted, so equal inputs give identical columns.
pub fn tf_idf(bags: &[Vec<String>]) -> (Vec<String>, Vec<Vec<f64>>) {
    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for bag in bags {
        let mut distinct: Vec<&str> = bag.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();
        for term in distinct {
            *document_frequency.entry(term).or_insert(0) += 1;
        }
    }

    if document_frequency.is_empty() {
        return (Vec::new(), vec![vec![0.0]; bags.len()]);
    }

    let n = bags.len() as f64;
    let column: BTreeMap<&str, usize> = document_frequency
        .keys()
        .enumerate()
        .map(|(idx, term)| (*term, idx))
        .collect();
    let idf: Vec<f64> = document_frequency
        .values()
        .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    let rows = bags
        .iter()
        .map(|bag| {
            let mut row = vec![0.0; column.len()];
            for term in bag {
                row[column[term.as_str()]] += 1.0;
            }
            for (weight, factor) in row.iter_mut().zip(&idf) {
                *weight *= factor;
            }
            row
        })
        .collect();

    let vocabulary = document_frequency.keys().map(|t| t.to_string()).collect();
    (vocabulary, rows)
}
