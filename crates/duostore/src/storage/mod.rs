//! Storage engine implementations.
//!
//! Two in-process engines implement the `duostore_core::storage::StoreDriver`
//! contract, one per backend flavor:
//!
//! - [`AttrStore`]: schemaless attribute store with a select expression
//!   language, string-encoded values and native batch writes.
//! - [`KeyStore`]: strict hash/range key store with typed values, direct key
//!   access and sequential batch emulation.
//!
//! Both keep data in shared memory behind tokio locks, so they double as
//! test fixtures and as the reference semantics for real backend drivers.

pub mod attrstore;
pub mod keystore;

pub use attrstore::AttrStore;
pub use keystore::KeyStore;
