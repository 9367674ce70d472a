use std::cmp::Ordering;

use crate::models::SimilarityResult;

/// Cosine similarity of two raw vectors
///
/// Vectors of different length, or a zero vector on either side, score 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Top `k` neighbors of `entity_id`
///
/// Scores descend strictly; equal scores are ordered by ascending id. The
/// query entity never appears in its own result. Returns nothing when the id
/// is absent or fewer than two entities exist.
pub fn top_k_similar(
    entity_id: i64,
    ids: &[i64],
    matrix: &[Vec<f64>],
    k: usize,
) -> Vec<SimilarityResult> {
    if k == 0 || ids.len() < 2 {
        return Vec::new();
    }
    let Some(query) = ids.iter().position(|&id| id == entity_id) else {
        return Vec::new();
    };
    let target = &matrix[query];

    let mut scored: Vec<(i64, f64)> = ids
        .iter()
        .zip(matrix)
        .filter(|(id, _)| **id != entity_id)
        .map(|(&id, row)| (id, cosine_similarity(target, row)))
        .collect();

    scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        order => order,
    });

    scored
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(idx, (id, score))| SimilarityResult {
            id,
            score,
            rank: idx + 1,
        })
        .collect()
}
