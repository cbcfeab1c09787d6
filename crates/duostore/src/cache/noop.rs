//! No-op cache provider.

use std::time::Duration;

use async_trait::async_trait;

use duostore_core::cache::{CacheStats, CacheStore, Result};

/// Cache provider that stores nothing.
///
/// Every `get` is a miss that is not counted, every write is accepted and
/// discarded. This is the provider to reach for when caching is disabled:
/// callers keep the same code path and only the provider changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCacheStore;

impl NoopCacheStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_is_always_a_miss() {
        let cache = NoopCacheStore::new();

        cache.put("key", b"value", None).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stats_stay_zero() {
        let cache = NoopCacheStore::new();

        cache.put("key", b"value", None).await.unwrap();
        cache.get("key").await.unwrap();
        cache.delete("key").await.unwrap();
        cache.clear().await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 0);
    }
}
