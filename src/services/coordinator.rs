use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::loader::{LoadOutcome, SnapshotLoader};
use super::vectors::{build_contributor_vectors, build_place_vectors, FeatureMatrix};
use crate::models::{EntityKind, Snapshot};

/// Reloads that race an invalidation are retried this many times in total
const MAX_RELOAD_ATTEMPTS: usize = 3;

/// A snapshot tagged with the generation it was installed as
#[derive(Debug)]
pub struct CachedSnapshot {
    pub generation: u64,
    pub snapshot: Arc<Snapshot>,
    pub loaded_at: Instant,
    /// Set when the store could not be read and this is a stale or empty fallback
    pub degraded: bool,
}

impl Deref for CachedSnapshot {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Point-in-time view of the cache, for health reporting
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStatus {
    pub generation: Option<u64>,
    pub degraded: bool,
    pub age_secs: Option<u64>,
    pub vector_sets: usize,
}

/// Everything that must change together
///
/// The current snapshot and the vectors derived from it live behind one lock
/// so a reader never sees one without the other.
#[derive(Default)]
struct CacheState {
    current: Option<Arc<CachedSnapshot>>,
    vectors: HashMap<(u64, EntityKind), Arc<FeatureMatrix>>,
    /// Most recent non-degraded snapshot; survives invalidation as the stale fallback
    last_good: Option<Arc<CachedSnapshot>>,
    /// Last degraded result handed out; never served from cache, cleared by a fresh install
    fallback: Option<Arc<CachedSnapshot>>,
    invalidations: u64,
}

/// Owns the time-boxed snapshot cache and the per-generation vector cache
///
/// Construct one per process and share it behind an `Arc`. Writers call
/// [`invalidate`](Self::invalidate) after committing so the next read
/// rebuilds from the store.
pub struct CacheCoordinator {
    loader: SnapshotLoader,
    ttl: Duration,
    state: RwLock<CacheState>,
    /// Serializes reloads so concurrent misses trigger a single load
    reload: Mutex<()>,
    next_generation: AtomicU64,
}

impl CacheCoordinator {
    pub fn new(loader: SnapshotLoader, ttl: Duration) -> Self {
        Self {
            loader,
            ttl,
            state: RwLock::new(CacheState::default()),
            reload: Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// The cached snapshot while younger than the TTL, otherwise a reload
    ///
    /// Never fails. When the store is unreachable the result is the last
    /// good snapshot or an empty one, flagged `degraded`. Degraded results
    /// are not cached, so the next call goes back to the store.
    pub async fn get_snapshot(&self) -> Arc<CachedSnapshot> {
        if let Some(current) = self.fresh().await {
            return current;
        }

        let requested = Instant::now();
        let _reload = self.reload.lock().await;
        if let Some(current) = self.fresh().await {
            return current;
        }
        // Callers queued behind a failed load share its result instead of each timing out in turn
        if let Some(fallback) = self.fallback_since(requested).await {
            return fallback;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let (epoch, prior) = {
                let state = self.state.read().await;
                (state.invalidations, state.last_good.clone())
            };

            let outcome = self
                .loader
                .load(prior.as_ref().map(|p| Arc::clone(&p.snapshot)))
                .await;
            let entry = Arc::new(self.entry_for(outcome, prior.as_deref()));

            let mut state = self.state.write().await;
            if state.invalidations != epoch {
                // The load may predate a committed write; installing it would hide that write
                if attempt < MAX_RELOAD_ATTEMPTS {
                    tracing::debug!(attempt, "Catalog invalidated during reload, loading again");
                    continue;
                }
                tracing::warn!(
                    generation = entry.generation,
                    "Catalog kept changing during reload, serving result uncached"
                );
                return entry;
            }

            if entry.degraded {
                state.fallback = Some(Arc::clone(&entry));
                tracing::warn!(
                    generation = entry.generation,
                    empty = entry.is_empty(),
                    "Serving degraded catalog uncached"
                );
                return entry;
            }

            state.last_good = Some(Arc::clone(&entry));
            state.fallback = None;
            state
                .vectors
                .retain(|(generation, _), _| *generation == entry.generation);
            state.current = Some(Arc::clone(&entry));

            tracing::info!(generation = entry.generation, "Installed catalog generation");
            return entry;
        }
    }

    /// Drops the cached snapshot and every vector set
    ///
    /// Idempotent. Callers that mutated the store must call this after the
    /// mutation is committed and before reporting success.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        let previous = state.current.take().map(|c| c.generation);
        state.vectors.clear();
        state.invalidations += 1;
        tracing::info!(previous_generation = ?previous, "Catalog cache invalidated");
    }

    /// Feature vectors of one entity kind, built at most once per generation
    ///
    /// The matrix always belongs to the returned snapshot's generation.
    pub async fn vectors(&self, kind: EntityKind) -> (Arc<CachedSnapshot>, Arc<FeatureMatrix>) {
        let snapshot = self.get_snapshot().await;
        let key = (snapshot.generation, kind);

        if let Some(matrix) = self.state.read().await.vectors.get(&key) {
            return (snapshot, Arc::clone(matrix));
        }

        let start = Instant::now();
        let built = Arc::new(match kind {
            EntityKind::Place => build_place_vectors(&snapshot),
            EntityKind::Contributor => build_contributor_vectors(&snapshot),
        });
        tracing::debug!(
            kind = %kind,
            generation = snapshot.generation,
            entities = built.len(),
            dimension = built.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built feature vectors"
        );

        let mut state = self.state.write().await;
        let live = state
            .current
            .as_ref()
            .is_some_and(|current| current.generation == snapshot.generation);
        if !live {
            return (snapshot, built);
        }
        // A concurrent builder may have won; keep whichever landed first
        let matrix = Arc::clone(state.vectors.entry(key).or_insert(built));
        (snapshot, matrix)
    }

    /// Reports the last degraded result while the store stays unreachable,
    /// the installed generation otherwise
    pub async fn status(&self) -> CacheStatus {
        let state = self.state.read().await;
        let shown = state.fallback.as_ref().or(state.current.as_ref());
        CacheStatus {
            generation: shown.map(|c| c.generation),
            degraded: state.fallback.is_some(),
            age_secs: shown.map(|c| c.loaded_at.elapsed().as_secs()),
            vector_sets: state.vectors.len(),
        }
    }

    async fn fresh(&self) -> Option<Arc<CachedSnapshot>> {
        let state = self.state.read().await;
        state
            .current
            .as_ref()
            .filter(|current| current.loaded_at.elapsed() < self.ttl)
            .cloned()
    }

    async fn fallback_since(&self, requested: Instant) -> Option<Arc<CachedSnapshot>> {
        let state = self.state.read().await;
        state
            .fallback
            .as_ref()
            .filter(|fallback| fallback.loaded_at >= requested)
            .cloned()
    }

    fn entry_for(&self, outcome: LoadOutcome, prior: Option<&CachedSnapshot>) -> CachedSnapshot {
        let (generation, snapshot, degraded) = match outcome {
            LoadOutcome::Fresh(snapshot) => (self.allocate_generation(), Arc::new(snapshot), false),
            LoadOutcome::Stale(snapshot, _) => {
                let generation = prior
                    .map(|p| p.generation)
                    .unwrap_or_else(|| self.allocate_generation());
                (generation, snapshot, true)
            }
            LoadOutcome::Empty(_) => (
                self.allocate_generation(),
                Arc::new(Snapshot::empty()),
                true,
            ),
        };

        CachedSnapshot {
            generation,
            snapshot,
            loaded_at: Instant::now(),
            degraded,
        }
    }

    fn allocate_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::source::MockSnapshotSource;
    use crate::db::{MemoryCatalog, SnapshotSource};
    use crate::error::CatalogError;
    use crate::models::RawCatalog;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn raw(places: usize) -> RawCatalog {
        RawCatalog {
            places: (1..=places).map(|id| json!({"id": id, "name": format!("P{}", id)})).collect(),
            reviews: vec![
                json!({"restaurant_id": 1, "reviewer_name": "Ann", "rating": 5}),
                json!({"restaurant_id": 2, "reviewer_name": "Ann", "rating": 4}),
            ],
            contributors: vec![json!({"reviewer_id": 7, "name": "Ann"})],
            ..Default::default()
        }
    }

    fn coordinator(source: impl SnapshotSource + 'static, ttl: Duration) -> CacheCoordinator {
        let loader = SnapshotLoader::new(Arc::new(source), Duration::from_secs(1));
        CacheCoordinator::new(loader, ttl)
    }

    fn healthy_source(expected_loads: usize) -> MockSnapshotSource {
        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch()
            .times(expected_loads)
            .returning(|| Ok(raw(3)));
        source.expect_name().return_const("mock");
        source
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_within_ttl() {
        let cache = coordinator(healthy_source(1), Duration::from_secs(600));

        let first = cache.get_snapshot().await;
        let second = cache.get_snapshot().await;

        assert_eq!(first.generation, second.generation);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.degraded);
        assert_eq!(first.places.len(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_triggers_exactly_one_reload() {
        let cache = coordinator(healthy_source(2), Duration::from_secs(600));

        let before = cache.get_snapshot().await;
        cache.invalidate().await;
        let after = cache.get_snapshot().await;
        let again = cache.get_snapshot().await;

        assert!(after.generation > before.generation);
        assert_eq!(after.generation, again.generation);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let cache = coordinator(healthy_source(1), Duration::from_secs(600));

        cache.invalidate().await;
        cache.invalidate().await;
        assert_eq!(cache.status().await.generation, None);

        cache.get_snapshot().await;
        assert!(cache.status().await.generation.is_some());
    }

    #[tokio::test]
    async fn test_expired_snapshot_reloads() {
        let cache = coordinator(healthy_source(2), Duration::ZERO);

        let first = cache.get_snapshot().await;
        let second = cache.get_snapshot().await;
        assert!(second.generation > first.generation);
    }

    #[tokio::test]
    async fn test_unreachable_store_without_prior_is_empty_and_degraded() {
        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch()
            .returning(|| Err(CatalogError::SourceUnavailable("down".to_string())));
        source.expect_name().return_const("mock");
        let cache = coordinator(source, Duration::from_secs(600));

        let snapshot = cache.get_snapshot().await;
        assert!(snapshot.degraded);
        assert!(snapshot.is_empty());
        assert!(cache.status().await.degraded);

        let (_, matrix) = cache.vectors(EntityKind::Place).await;
        assert!(matrix.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_serves_last_good_snapshot() {
        let mut calls = 0;
        let mut source = MockSnapshotSource::new();
        source.expect_fetch().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(raw(2))
            } else {
                Err(CatalogError::SourceUnavailable("down".to_string()))
            }
        });
        source.expect_name().return_const("mock");
        let cache = coordinator(source, Duration::from_secs(600));

        let good = cache.get_snapshot().await;
        cache.invalidate().await;
        let stale = cache.get_snapshot().await;

        assert!(stale.degraded);
        assert_eq!(stale.generation, good.generation);
        assert!(Arc::ptr_eq(&stale.snapshot, &good.snapshot));
    }

    fn memory_coordinator(store: &Arc<MemoryCatalog>) -> CacheCoordinator {
        let loader = SnapshotLoader::new(store.clone(), Duration::from_secs(1));
        CacheCoordinator::new(loader, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_empty_fallback_is_not_cached_once_store_recovers() {
        let store = Arc::new(MemoryCatalog::new(raw(2)));
        store.set_online(false);
        let cache = memory_coordinator(&store);

        let offline = cache.get_snapshot().await;
        assert!(offline.degraded);
        assert!(offline.is_empty());
        assert!(cache.status().await.degraded);

        store.set_online(true);
        let online = cache.get_snapshot().await;
        assert!(!online.degraded);
        assert_eq!(online.places.len(), 2);
        assert!(online.generation > offline.generation);
        assert_eq!(store.fetch_count(), 2);

        let status = cache.status().await;
        assert!(!status.degraded);
        assert_eq!(status.generation, Some(online.generation));

        // the recovered snapshot is cached as usual
        cache.get_snapshot().await;
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_fallback_after_write_is_retried_on_next_read() {
        let store = Arc::new(MemoryCatalog::new(raw(2)));
        let cache = memory_coordinator(&store);

        let good = cache.get_snapshot().await;
        cache.invalidate().await;
        store.set_online(false);
        let stale = cache.get_snapshot().await;
        assert!(stale.degraded);
        assert_eq!(stale.generation, good.generation);

        store.set_online(true);
        let reloaded = cache.get_snapshot().await;
        assert!(!reloaded.degraded);
        assert!(reloaded.generation > good.generation);
        assert_eq!(store.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_vectors_are_memoized_per_generation() {
        let cache = coordinator(healthy_source(2), Duration::from_secs(600));

        let (snap_a, first) = cache.vectors(EntityKind::Place).await;
        let (_, second) = cache.vectors(EntityKind::Place).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.status().await.vector_sets, 1);

        cache.invalidate().await;
        assert_eq!(cache.status().await.vector_sets, 0);

        let (snap_b, third) = cache.vectors(EntityKind::Place).await;
        assert!(snap_b.generation > snap_a.generation);
        assert!(!Arc::ptr_eq(&first, &third));
        // same store contents, so the rebuilt matrix is value-identical
        assert_eq!(*first, *third);
    }

    #[tokio::test]
    async fn test_vector_kinds_are_cached_separately() {
        let cache = coordinator(healthy_source(1), Duration::from_secs(600));

        let (_, places) = cache.vectors(EntityKind::Place).await;
        let (_, contributors) = cache.vectors(EntityKind::Contributor).await;
        assert_eq!(places.ids, vec![1, 2, 3]);
        assert_eq!(contributors.ids, vec![7]);
        assert_eq!(cache.status().await.vector_sets, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_share_one_reload() {
        let cache = Arc::new(coordinator(healthy_source(2), Duration::from_secs(600)));
        cache.get_snapshot().await;
        cache.invalidate().await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let (snapshot, matrix) = cache.vectors(EntityKind::Place).await;
                    (snapshot.generation, matrix.len())
                })
            })
            .collect();

        let mut generations = Vec::new();
        for handle in handles {
            let (generation, len) = handle.await.unwrap();
            assert_eq!(len, 3);
            generations.push(generation);
        }
        generations.dedup();
        assert_eq!(generations.len(), 1);
    }

    /// Blocks its first fetch until released, so a test can invalidate mid-load
    struct GatedSource {
        fetches: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl SnapshotSource for Arc<GatedSource> {
        async fn fetch(&self) -> Result<RawCatalog, CatalogError> {
            let call = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if call == 1 {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(raw(call))
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_invalidation_during_reload_is_not_lost() {
        let source = Arc::new(GatedSource {
            fetches: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let cache = Arc::new(coordinator(Arc::clone(&source), Duration::from_secs(600)));

        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_snapshot().await })
        };

        source.entered.notified().await;
        cache.invalidate().await;
        source.release.notify_one();

        let snapshot = reader.await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        // the second load is the one that observed the write
        assert_eq!(snapshot.places.len(), 2);
        assert_eq!(cache.status().await.generation, Some(snapshot.generation));
    }
}
