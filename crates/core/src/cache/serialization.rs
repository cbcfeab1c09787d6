//! Cached-record envelope and its byte form.
//!
//! Records are cached as JSON for easy inspection. The envelope carries an
//! absolute expiration so the manager can treat a stale entry as a miss
//! even when the underlying store does not expire entries itself.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::RawItem;

/// Errors that can occur during cache serialization/deserialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Failed to serialize a value to bytes.
    #[error("Failed to serialize: {0}")]
    SerializeFailed(String),
    /// Failed to deserialize bytes to a value.
    #[error("Failed to deserialize: {0}")]
    DeserializeFailed(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

/// A cached record with its absolute expiration in unix milliseconds
/// (`None` = never).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub expires_at_ms: Option<i64>,
    pub item: RawItem,
}

impl CacheEnvelope {
    pub fn new(item: RawItem, ttl: Option<Duration>) -> Self {
        let expires_at_ms = ttl.map(|d| Utc::now().timestamp_millis() + d.as_millis() as i64);
        Self { expires_at_ms, item }
    }

    /// True once the expiration has passed.
    pub fn is_stale(&self) -> bool {
        self.expires_at_ms
            .is_some_and(|at| at <= Utc::now().timestamp_millis())
    }
}

/// Serializes an envelope to JSON bytes.
pub fn serialize_envelope(envelope: &CacheEnvelope) -> Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

/// Deserializes JSON bytes to an envelope.
pub fn deserialize_envelope(bytes: &[u8]) -> Result<CacheEnvelope> {
    serde_json::from_slice(bytes).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn sample_item() -> RawItem {
        let mut item = RawItem::new();
        item.insert("name".to_string(), Value::Str("abc".into()));
        item.insert("age".to_string(), Value::Int(25));
        item
    }

    #[test]
    fn test_roundtrip() {
        let envelope = CacheEnvelope::new(sample_item(), Some(Duration::from_secs(60)));
        let bytes = serialize_envelope(&envelope).expect("serialize should succeed");
        let back = deserialize_envelope(&bytes).expect("deserialize should succeed");
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_no_ttl_never_goes_stale() {
        let envelope = CacheEnvelope::new(sample_item(), None);
        assert_eq!(envelope.expires_at_ms, None);
        assert!(!envelope.is_stale());
    }

    #[test]
    fn test_past_expiration_is_stale() {
        let mut envelope = CacheEnvelope::new(sample_item(), Some(Duration::from_secs(60)));
        assert!(!envelope.is_stale());
        envelope.expires_at_ms = Some(Utc::now().timestamp_millis() - 1);
        assert!(envelope.is_stale());
    }

    #[test]
    fn test_malformed_bytes_fail_to_deserialize() {
        let result = deserialize_envelope(b"not json at all");
        assert!(matches!(result, Err(SerializationError::DeserializeFailed(_))));
    }
}
