//! Strict hash/range key store engine.

mod engine;

pub use engine::KeyStore;
