//! Cache providers and the object cache manager.
//!
//! This module provides concrete implementations of the [`CacheStore`] trait
//! defined in `duostore_core::cache`, plus the [`ObjectCache`] manager that
//! the data-access layer talks to. Providers are picked at construction
//! time, so a single build can mix cached and uncached setups.
//!
//! # Feature Flags
//!
//! - `redis`: adds the Redis provider for multi-process deployments. The
//!   in-memory and no-op providers are always available.
//!
//! [`CacheStore`]: duostore_core::cache::CacheStore

mod manager;
pub mod memory;
mod noop;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use manager::ObjectCache;
pub use memory::LruCacheStore;
pub use noop::NoopCacheStore;

#[cfg(feature = "redis")]
pub use redis_impl::RedisCacheStore;
