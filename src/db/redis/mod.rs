//! Redis-backed cache for generated narrative text

pub mod cache;

mod macros;

pub use cache::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
