use std::sync::Arc;

use super::coordinator::{CacheCoordinator, CachedSnapshot};
use super::ranker;
use crate::{
    error::CatalogError,
    models::{EntityKind, SimilarityResult},
};

/// Neighbors of one entity, with the snapshot they were ranked in
pub struct Neighbors {
    pub snapshot: Arc<CachedSnapshot>,
    pub results: Vec<SimilarityResult>,
}

/// Top `k` entities of the same kind most similar to `entity_id`
///
/// Scores come from a single generation's vectors. An unknown id or a catalog
/// with fewer than two entities yields an empty list rather than an error.
pub async fn top_k_similar(
    coordinator: &CacheCoordinator,
    kind: EntityKind,
    entity_id: i64,
    k: usize,
) -> Neighbors {
    let (snapshot, matrix) = coordinator.vectors(kind).await;

    if matrix.len() < 2 {
        let err = CatalogError::EmptyCatalog(kind);
        tracing::debug!(error = %err, generation = snapshot.generation, "No neighbors");
        return Neighbors {
            snapshot,
            results: Vec::new(),
        };
    }
    if matrix.vector(entity_id).is_none() {
        let err = CatalogError::UnknownEntity {
            kind,
            id: entity_id,
        };
        tracing::debug!(error = %err, generation = snapshot.generation, "No neighbors");
        return Neighbors {
            snapshot,
            results: Vec::new(),
        };
    }

    let results = ranker::top_k_similar(entity_id, &matrix.ids, &matrix.rows, k);
    tracing::debug!(
        kind = %kind,
        entity_id,
        k,
        returned = results.len(),
        generation = snapshot.generation,
        "Ranked similar entities"
    );

    Neighbors { snapshot, results }
}
