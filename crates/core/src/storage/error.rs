use thiserror::Error;

use super::types::StoreKind;

/// Errors raised by Dao, query and driver operations.
///
/// Cache faults are deliberately absent: they are swallowed by the cache
/// manager and never reach callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Wrong key scalar type, missing range key, unknown field, or a
    /// rejected field value.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The backend's conditional check did not hold. The caller owns the
    /// re-fetch-and-retry decision; nothing here retries.
    #[error("Conditional write failed for {model}: {detail}")]
    WriteConflict { model: String, detail: String },
    /// The requested filter/order/projection exceeds the backend's
    /// declared capability set.
    #[error("Not supported on {store}: {what}")]
    Unsupported { store: StoreKind, what: String },
    #[error("Table not found: {0}")]
    TableMissing(String),
    #[error("Table already exists: {0}")]
    TableExists(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Any lower-level driver failure, carrying the original cause text.
    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
