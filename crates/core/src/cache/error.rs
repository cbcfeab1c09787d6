use thiserror::Error;

use super::serialization::SerializationError;

/// Errors that can occur during cache operations.
///
/// These never cross the cache boundary: the object cache manager logs and
/// swallows every one of them so a caching fault cannot fail a read/write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<SerializationError> for CacheError {
    fn from(err: SerializationError) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_display() {
        let error = CacheError::ConnectionFailed("timeout".to_string());
        assert_eq!(error.to_string(), "Cache connection failed: timeout");
    }

    #[test]
    fn test_operation_failed_display() {
        let error = CacheError::OperationFailed("store full".to_string());
        assert_eq!(error.to_string(), "Cache operation failed: store full");
    }

    #[test]
    fn test_serialization_display() {
        let error = CacheError::Serialization("invalid JSON".to_string());
        assert_eq!(error.to_string(), "Serialization error: invalid JSON");
    }

    #[test]
    fn test_from_serialization_error() {
        let inner = SerializationError::DeserializeFailed("bad bytes".to_string());
        let error: CacheError = inner.into();
        assert_eq!(
            error,
            CacheError::Serialization("Failed to deserialize: bad bytes".to_string())
        );
    }
}
