//! In-memory cache provider.
//!
//! Provides a thread-safe in-memory cache with TTL support and LRU
//! eviction for single-process deployments.

mod cache;

pub use cache::LruCacheStore;
