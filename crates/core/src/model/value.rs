use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Scalar kinds a model field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Str,
    Int,
    Long,
    Float,
    Double,
    Date,
    StrSet,
    IntSet,
    LongSet,
}

impl ValueKind {
    /// Returns true for kinds acceptable as id or range-key values.
    pub fn is_key_kind(&self) -> bool {
        matches!(self, ValueKind::Str | ValueKind::Int | ValueKind::Long)
    }

    /// Returns the element kind for set kinds, or the kind itself for scalars.
    pub fn element(&self) -> ValueKind {
        match self {
            ValueKind::StrSet => ValueKind::Str,
            ValueKind::IntSet => ValueKind::Int,
            ValueKind::LongSet => ValueKind::Long,
            other => *other,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, ValueKind::StrSet | ValueKind::IntSet | ValueKind::LongSet)
    }

    /// Returns true for kinds stored as numbers by the key store.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueKind::Int | ValueKind::Long | ValueKind::Float | ValueKind::Double
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Str => "str",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Date => "date",
            ValueKind::StrSet => "str-set",
            ValueKind::IntSet => "int-set",
            ValueKind::LongSet => "long-set",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type-erased field value.
///
/// Records cross the cache and driver boundaries as maps of `Value`, so the
/// engine never needs to know a record's concrete shape. `Null` stands for
/// an unset field and is skipped when a record is lowered to its raw form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Null,
    Str(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(DateTime<Utc>),
    StrSet(BTreeSet<String>),
    IntSet(BTreeSet<i32>),
    LongSet(BTreeSet<i64>),
}

impl Value {
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Str(_) => Some(ValueKind::Str),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Long(_) => Some(ValueKind::Long),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Double(_) => Some(ValueKind::Double),
            Value::Date(_) => Some(ValueKind::Date),
            Value::StrSet(_) => Some(ValueKind::StrSet),
            Value::IntSet(_) => Some(ValueKind::IntSet),
            Value::LongSet(_) => Some(ValueKind::LongSet),
        }
    }

    /// True for `Null`, the empty string, and empty sets.
    ///
    /// Default-value generators only fill fields that report empty here.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            Value::StrSet(s) => s.is_empty(),
            Value::IntSet(s) => s.is_empty(),
            Value::LongSet(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Canonical string encoding.
    ///
    /// The encoding is order-preserving for `Str`, `Int`, `Long` and `Date`
    /// so that lexicographic comparison on encoded text matches value order:
    /// integers are shifted past zero and zero-padded (width 10 for `Int`,
    /// 20 for `Long`), dates render as fixed-precision RFC 3339 in UTC.
    /// Floats round-trip but do not order lexicographically. Sets join their
    /// element encodings with a comma; use [`Value::canonical_elements`]
    /// where elements matter.
    pub fn canonical_encode(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Str(s) => s.clone(),
            Value::Int(i) => encode_int(*i),
            Value::Long(l) => encode_long(*l),
            Value::Float(f) => f.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
            Value::StrSet(s) => s.iter().cloned().collect::<Vec<_>>().join(","),
            Value::IntSet(s) => s.iter().map(|i| encode_int(*i)).collect::<Vec<_>>().join(","),
            Value::LongSet(s) => s.iter().map(|l| encode_long(*l)).collect::<Vec<_>>().join(","),
        }
    }

    /// Canonical encodings of the individual values: one entry for scalars,
    /// one per element for sets.
    pub fn canonical_elements(&self) -> Vec<String> {
        match self {
            Value::Null => Vec::new(),
            Value::StrSet(s) => s.iter().cloned().collect(),
            Value::IntSet(s) => s.iter().map(|i| encode_int(*i)).collect(),
            Value::LongSet(s) => s.iter().map(|l| encode_long(*l)).collect(),
            scalar => vec![scalar.canonical_encode()],
        }
    }

    /// Decodes a canonical encoding back into a value of the given kind.
    pub fn canonical_decode(kind: ValueKind, text: &str) -> Result<Value, String> {
        match kind {
            ValueKind::Str => Ok(Value::Str(text.to_string())),
            ValueKind::Int => decode_int(text).map(Value::Int),
            ValueKind::Long => decode_long(text).map(Value::Long),
            ValueKind::Float => text
                .parse::<f32>()
                .map(Value::Float)
                .map_err(|e| format!("invalid float encoding {text:?}: {e}")),
            ValueKind::Double => text
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| format!("invalid double encoding {text:?}: {e}")),
            ValueKind::Date => DateTime::parse_from_rfc3339(text)
                .map(|d| Value::Date(d.with_timezone(&Utc)))
                .map_err(|e| format!("invalid date encoding {text:?}: {e}")),
            ValueKind::StrSet => {
                if text.is_empty() {
                    return Ok(Value::StrSet(BTreeSet::new()));
                }
                Ok(Value::StrSet(text.split(',').map(str::to_string).collect()))
            }
            ValueKind::IntSet => {
                if text.is_empty() {
                    return Ok(Value::IntSet(BTreeSet::new()));
                }
                let mut set = BTreeSet::new();
                for part in text.split(',') {
                    set.insert(decode_int(part)?);
                }
                Ok(Value::IntSet(set))
            }
            ValueKind::LongSet => {
                if text.is_empty() {
                    return Ok(Value::LongSet(BTreeSet::new()));
                }
                let mut set = BTreeSet::new();
                for part in text.split(',') {
                    set.insert(decode_long(part)?);
                }
                Ok(Value::LongSet(set))
            }
        }
    }

    /// Rebuilds a value of the given kind from individual element encodings,
    /// the inverse of [`Value::canonical_elements`]. Set kinds collect one
    /// element per entry; scalar kinds read the first entry and decode an
    /// empty slice as `Null`.
    pub fn canonical_decode_elements(kind: ValueKind, parts: &[String]) -> Result<Value, String> {
        match kind {
            ValueKind::StrSet => Ok(Value::StrSet(parts.iter().cloned().collect())),
            ValueKind::IntSet => {
                let mut set = BTreeSet::new();
                for part in parts {
                    set.insert(decode_int(part)?);
                }
                Ok(Value::IntSet(set))
            }
            ValueKind::LongSet => {
                let mut set = BTreeSet::new();
                for part in parts {
                    set.insert(decode_long(part)?);
                }
                Ok(Value::LongSet(set))
            }
            scalar => match parts.first() {
                Some(first) => Value::canonical_decode(scalar, first),
                None => Ok(Value::Null),
            },
        }
    }

    /// Converts the value to the given kind, widening `Int` to `Long` where
    /// needed. Anything else is a kind mismatch.
    pub fn coerce(self, kind: ValueKind) -> Result<Value, String> {
        match (&self, kind) {
            (Value::Int(i), ValueKind::Long) => Ok(Value::Long(*i as i64)),
            _ => match self.kind() {
                Some(k) if k == kind => Ok(self),
                Some(k) => Err(format!("expected {kind}, found {k}")),
                None => Err(format!("expected {kind}, found null")),
            },
        }
    }

    pub fn try_into_string(self) -> Result<String, String> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(mismatch("str", &other)),
        }
    }

    pub fn try_into_int(self) -> Result<i32, String> {
        match self {
            Value::Int(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }

    /// Accepts `Int` as well, widening it.
    pub fn try_into_long(self) -> Result<i64, String> {
        match self {
            Value::Long(l) => Ok(l),
            Value::Int(i) => Ok(i as i64),
            other => Err(mismatch("long", &other)),
        }
    }

    pub fn try_into_float(self) -> Result<f32, String> {
        match self {
            Value::Float(f) => Ok(f),
            other => Err(mismatch("float", &other)),
        }
    }

    pub fn try_into_double(self) -> Result<f64, String> {
        match self {
            Value::Double(d) => Ok(d),
            Value::Float(f) => Ok(f as f64),
            other => Err(mismatch("double", &other)),
        }
    }

    pub fn try_into_date(self) -> Result<DateTime<Utc>, String> {
        match self {
            Value::Date(d) => Ok(d),
            other => Err(mismatch("date", &other)),
        }
    }

    pub fn try_into_str_set(self) -> Result<BTreeSet<String>, String> {
        match self {
            Value::StrSet(s) => Ok(s),
            other => Err(mismatch("str-set", &other)),
        }
    }

    pub fn try_into_int_set(self) -> Result<BTreeSet<i32>, String> {
        match self {
            Value::IntSet(s) => Ok(s),
            other => Err(mismatch("int-set", &other)),
        }
    }

    pub fn try_into_long_set(self) -> Result<BTreeSet<i64>, String> {
        match self {
            Value::LongSet(s) => Ok(s),
            other => Err(mismatch("long-set", &other)),
        }
    }

    /// Reads an integer-kind value as `i64`, treating anything else as absent.
    ///
    /// Version tracking uses this: an unset or non-numeric version reads as 0.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> String {
    match found.kind() {
        Some(k) => format!("expected {expected}, found {k}"),
        None => format!("expected {expected}, found null"),
    }
}

fn encode_int(i: i32) -> String {
    format!("{:010}", (i as i64 - i32::MIN as i64) as u64)
}

fn decode_int(text: &str) -> Result<i32, String> {
    let raw: u64 = text
        .parse()
        .map_err(|e| format!("invalid int encoding {text:?}: {e}"))?;
    if raw > u32::MAX as u64 {
        return Err(format!("int encoding out of range: {text:?}"));
    }
    Ok((raw as i64 + i32::MIN as i64) as i32)
}

fn encode_long(l: i64) -> String {
    format!("{:020}", (l as i128 - i64::MIN as i128) as u128)
}

fn decode_long(text: &str) -> Result<i64, String> {
    let raw: u128 = text
        .parse()
        .map_err(|e| format!("invalid long encoding {text:?}: {e}"))?;
    if raw > u64::MAX as u128 {
        return Err(format!("long encoding out of range: {text:?}"));
    }
    Ok((raw as i128 + i64::MIN as i128) as i64)
}

/// Plain human-readable form: unpadded numbers, RFC 3339 dates, elements
/// joined with a comma. Composite fields concatenate this form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::StrSet(s) => f.write_str(&s.iter().cloned().collect::<Vec<_>>().join(",")),
            Value::IntSet(s) => f.write_str(
                &s.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(","),
            ),
            Value::LongSet(s) => f.write_str(
                &s.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(","),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}
