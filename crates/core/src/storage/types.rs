use std::collections::HashMap;
use std::fmt;

use crate::model::{Value, ValueKind};
use crate::query::PageToken;

/// The closed set of backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Flexible attribute store: schemaless items, ad hoc query language,
    /// string-encoded attributes compared lexicographically.
    AttrStore,
    /// Strict hash/range key store: declared key schema, narrow operator
    /// set, typed attributes.
    KeyStore,
}

impl StoreKind {
    /// Identity string used in cache keys and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::AttrStore => "attrstore",
            StoreKind::KeyStore => "keystore",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record in its type-erased form: attribute name to value.
pub type RawItem = HashMap<String, Value>;

/// An id value with its optional range-key value.
pub type KeyPair = (Value, Option<Value>);

/// One key attribute of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSchema {
    pub name: String,
    pub kind: ValueKind,
}

/// The driver-facing view of a model: key layout and attribute kinds,
/// nothing about the record type.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub model_name: String,
    pub table_name: String,
    pub id_attr: AttrSchema,
    pub range_attr: Option<AttrSchema>,
    pub version_attr: Option<String>,
    pub attr_kinds: HashMap<String, ValueKind>,
}

impl TableSchema {
    pub fn attr_kind(&self, attr: &str) -> Option<ValueKind> {
        self.attr_kinds.get(attr).copied()
    }
}

/// Condition attached to a single-object put.
///
/// `Absent` succeeds only while the attribute does not exist (the item may
/// be missing entirely); `Equals` only while the stored attribute equals
/// the given value.
#[derive(Debug, Clone, PartialEq)]
pub enum PutCondition {
    Absent { attr: String },
    Equals { attr: String, value: Value },
}

impl PutCondition {
    pub fn attr(&self) -> &str {
        match self {
            PutCondition::Absent { attr } => attr,
            PutCondition::Equals { attr, .. } => attr,
        }
    }
}

/// One batch of query results plus the continuation cursor, if any.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<RawItem>,
    pub next: Option<PageToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_identity_strings() {
        assert_eq!(StoreKind::AttrStore.as_str(), "attrstore");
        assert_eq!(StoreKind::KeyStore.as_str(), "keystore");
        assert_eq!(StoreKind::KeyStore.to_string(), "keystore");
    }

    #[test]
    fn test_put_condition_attr() {
        let absent = PutCondition::Absent { attr: "version".to_string() };
        let equals = PutCondition::Equals { attr: "version".to_string(), value: Value::Long(2) };
        assert_eq!(absent.attr(), "version");
        assert_eq!(equals.attr(), "version");
    }
}
