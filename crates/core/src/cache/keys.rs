//! Cache key derivation.
//!
//! Pure functions of backend identity, model name and encoded field values,
//! so the same logical record always lands on the same key no matter which
//! code path produced it. Values use their canonical encoding, which keeps
//! numerically equal keys textually equal.

use crate::model::Value;
use crate::storage::StoreKind;

/// Primary-key cache key: `{store}/{model}/pk/{id}` with the encoded range
/// value appended when present.
pub fn pk_key(store: StoreKind, model: &str, id: &Value, range: Option<&Value>) -> String {
    match range {
        Some(range) => format!(
            "{}/{}/pk/{}/{}",
            store,
            model,
            id.canonical_encode(),
            range.canonical_encode()
        ),
        None => format!("{}/{}/pk/{}", store, model, id.canonical_encode()),
    }
}

/// Secondary-index cache key: `{store}/{model}/{field}/{value}`.
pub fn field_key(store: StoreKind, model: &str, field: &str, value: &Value) -> String {
    format!("{}/{}/{}/{}", store, model, field, value.canonical_encode())
}
