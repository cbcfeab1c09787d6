//! Redis error mapping to CacheError.

use duostore_core::cache::CacheError;

/// Maps Redis errors to CacheError.
pub fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
        CacheError::ConnectionFailed(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_error_maps_to_operation_failed() {
        let err = redis::RedisError::from((redis::ErrorKind::ResponseError, "bad reply"));
        let mapped = map_redis_error(err);

        assert!(matches!(mapped, CacheError::OperationFailed(_)));
    }

    #[test]
    fn test_type_error_maps_to_operation_failed() {
        let err = redis::RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        let mapped = map_redis_error(err);

        assert!(matches!(mapped, CacheError::OperationFailed(_)));
    }
}
