/// Read-through caching over an optional Redis [`Cache`](super::Cache).
///
/// Evaluates to `Ok(value)` from the cache when there is one. Otherwise awaits
/// `$block`, which must produce a `Result`; an `Ok` value is queued for
/// storage with the given TTL, an `Err` is passed through and never stored.
/// A cache that is absent or failing only costs the lookup: errors are
/// logged and treated as a miss.
///
/// # Arguments
/// * `$cache`: an `Option<Cache>` (or a reference to one).
/// * `$key`: the [`CacheKey`](super::CacheKey) to read and write.
/// * `$ttl`: time-to-live in seconds for a newly stored value.
/// * `$block`: a future producing `Result<T, E>` on a miss.
///
/// # Example
/// ```rust,ignore
/// let text: AppResult<String> = cached!(self.cache, key, 3600, async {
///     generator.generate(system, &prompt).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        let hit = match $cache.as_ref() {
            Some(cache) => match cache.get_from_cache(&key).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Cache lookup failed, treating as miss");
                    None
                }
            },
            None => None,
        };

        match hit {
            Some(value) => Ok(value),
            None => match $block.await {
                Ok(value) => {
                    if let Some(cache) = $cache.as_ref() {
                        cache.set_in_background(&key, &value, $ttl);
                    }
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        }
    }};
}
