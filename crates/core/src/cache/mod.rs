mod error;
mod keys;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use keys::{field_key, pk_key};
pub use serialization::{
    deserialize_envelope, serialize_envelope, CacheEnvelope, SerializationError,
};
pub use traits::{CacheStats, CacheStore};
