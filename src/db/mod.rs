pub mod memory;
pub mod postgres;
pub mod redis;
pub mod source;

pub use memory::MemoryCatalog;
pub use postgres::{create_pool, PostgresCatalog};
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;
pub use source::{CatalogWriter, FollowChange, SnapshotSource};
