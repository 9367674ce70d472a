use std::sync::Arc;

use crate::services::{CacheCoordinator, NarrativeService, WriteGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<CacheCoordinator>,
    pub writes: WriteGateway,
    pub narrative: NarrativeService,
}

impl AppState {
    pub fn new(
        coordinator: Arc<CacheCoordinator>,
        writes: WriteGateway,
        narrative: NarrativeService,
    ) -> Self {
        Self {
            coordinator,
            writes,
            narrative,
        }
    }
}
