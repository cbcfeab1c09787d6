//! Redis cache provider.
//!
//! Provides a distributed cache using Redis for multi-process deployments.
//! Supports connection pooling and TTL.

mod cache;
mod error;

pub use cache::RedisCacheStore;
