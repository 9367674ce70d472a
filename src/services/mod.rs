pub mod catalog;
pub mod coordinator;
pub mod loader;
pub mod narrative;
pub mod ranker;
pub mod recommendations;
pub mod vectors;
pub mod writes;

pub use coordinator::{CacheCoordinator, CacheStatus, CachedSnapshot};
pub use loader::{LoadOutcome, SnapshotLoader};
pub use narrative::{NarrativeService, OllamaGenerator, TextGenerator};
pub use writes::WriteGateway;
