use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    db::SnapshotSource,
    error::CatalogError,
    models::Snapshot,
};

/// What a load attempt produced
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The store answered; this is a new point-in-time copy
    Fresh(Snapshot),
    /// The store failed; the last good snapshot is served again
    Stale(Arc<Snapshot>, CatalogError),
    /// The store failed and there was nothing to fall back to
    Empty(CatalogError),
}

impl LoadOutcome {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, LoadOutcome::Fresh(_))
    }
}

/// Fetches the four catalog relations and coerces them into a [`Snapshot`]
///
/// Never fails: an unreachable or slow store degrades to the prior snapshot,
/// or to an empty one.
#[derive(Clone)]
pub struct SnapshotLoader {
    source: Arc<dyn SnapshotSource>,
    timeout: Duration,
}

impl SnapshotLoader {
    pub fn new(source: Arc<dyn SnapshotSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub async fn load(&self, prior: Option<Arc<Snapshot>>) -> LoadOutcome {
        let start = Instant::now();

        let fetched = match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::SourceUnavailable(format!(
                "{} did not answer within {:?}",
                self.source.name(),
                self.timeout
            ))),
        };

        match fetched {
            Ok(raw) => {
                let snapshot = Snapshot::from_raw(&raw);
                tracing::info!(
                    source = self.source.name(),
                    places = snapshot.places.len(),
                    reviews = snapshot.reviews.len(),
                    contributors = snapshot.contributors.len(),
                    users = snapshot.users.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Catalog snapshot loaded"
                );
                LoadOutcome::Fresh(snapshot)
            }
            Err(e) => match prior {
                Some(snapshot) => {
                    tracing::warn!(error = %e, "Catalog source failed, serving stale snapshot");
                    LoadOutcome::Stale(snapshot, e)
                }
                None => {
                    tracing::warn!(error = %e, "Catalog source failed with no prior snapshot, serving empty catalog");
                    LoadOutcome::Empty(e)
                }
            },
        }
    }
}
