//! Core contracts for the duostore persistence engine.
//!
//! This crate holds the pieces shared by every backend and cache
//! implementation: the scalar [`model::Value`] type and its canonical
//! string encoding, model descriptors and the registry that owns them,
//! cache key derivation and the cache provider trait, the store driver
//! trait with its capability profile, and the query plan types.
//!
//! Nothing in here performs I/O; engines and providers live in the
//! `duostore` crate.

pub mod cache;
pub mod model;
pub mod query;
pub mod storage;
