//! Object persistence over divergent storage backends.
//!
//! duostore maps registered record models onto two backends with very
//! different query surfaces: a flexible attribute store queried through a
//! rendered select expression, and a strict hash/range key store. One
//! [`Dao`] API covers both, adding optimistic concurrency, generated and
//! derived fields, lifecycle hooks and a best-effort write-through object
//! cache in front of either backend.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use duostore::{AttrStore, Dao, LruCacheStore};
//! use duostore_core::model::Registry;
//!
//! let mut registry = Registry::new();
//! registry.register(person_model())?;
//!
//! let dao: Dao<Person> = Dao::new(
//!     &registry,
//!     Arc::new(AttrStore::new()),
//!     Arc::new(LruCacheStore::new(10_000)),
//! )?;
//! dao.create_table().await?;
//!
//! let mut person = Person::new("abc", 25);
//! dao.put(&mut person).await?;
//! let found = dao.get(person.id.clone()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod dao;
pub mod query;
pub mod storage;

#[cfg(feature = "redis")]
pub use cache::RedisCacheStore;
pub use cache::{LruCacheStore, NoopCacheStore, ObjectCache};
pub use config::Config;
pub use dao::Dao;
pub use query::{Query, QueryOp};
pub use storage::{AttrStore, KeyStore};

// Re-export the contracts crate for convenience.
pub use duostore_core as core;
