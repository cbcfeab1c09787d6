use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// Hit/miss counters exposed by every provider for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn dump(&self) -> String {
        format!(
            "hits: {}, misses: {}, entries: {}",
            self.hits, self.misses, self.entries
        )
    }
}

/// Trait for cache providers.
///
/// Providers store opaque bytes under string keys. TTL handling is the
/// provider's job where it can (the manager keeps its own staleness
/// backstop for providers that cannot).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets a value from the cache by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Puts a value in the cache with an optional TTL.
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Deletes a value from the cache by key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Drops every entry.
    async fn clear(&self) -> Result<()>;

    fn stats(&self) -> CacheStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_dump() {
        let stats = CacheStats { hits: 3, misses: 1, entries: 2 };
        assert_eq!(stats.dump(), "hits: 3, misses: 1, entries: 2");
    }

    #[test]
    fn test_stats_default_is_zeroed() {
        assert_eq!(CacheStats::default(), CacheStats { hits: 0, misses: 0, entries: 0 });
    }
}
