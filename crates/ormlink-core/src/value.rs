//! Dynamic values stored in rows and passed to drivers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A single property value.
///
/// Drivers receive and return values in this representation; the instance
/// layer never sees backend-native types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL / missing document field.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer (also used for serial keys).
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
    /// Ordered list of values (IN lists, multi-reference fields).
    Array(Vec<Value>),
}

impl Value {
    /// True for `Value::Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of this value; doubles with no fractional part convert.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::BigInt(i) | Value::Timestamp(i) => Some(*i),
            Value::Double(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Float view of numeric values.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::BigInt(i) | Value::Timestamp(i) => Some(*i as f64),
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Array payload.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Name of the variant, used in validation messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::BigInt(_) => "integer",
            Value::Double(_) => "number",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
        }
    }

    /// Equality that treats numerically equal integers and doubles as equal.
    ///
    /// Filters use this so a key read back as `Double(1.0)` still matches
    /// `BigInt(1)`. `Null` never equals anything, including `Null`.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    /// Total order used for sorting result sets.
    ///
    /// `Null` sorts first; values of unrelated types order by variant rank.
    #[must_use]
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::BigInt(_) | Value::Double(_) | Value::Timestamp(_) => 2,
            Value::Text(_) => 3,
            Value::Bytes(_) => 4,
            Value::Json(_) => 5,
            Value::Array(_) => 6,
        }
    }

    /// Feed this value into a hasher.
    ///
    /// Integral doubles hash like the matching integer so keys compare the
    /// same way `loose_eq` does.
    pub fn hash_into(&self, hasher: &mut impl Hasher) {
        match self {
            Value::Null => 0u8.hash(hasher),
            Value::Bool(b) => {
                1u8.hash(hasher);
                b.hash(hasher);
            }
            Value::BigInt(_) | Value::Timestamp(_) | Value::Double(_) => match self.as_i64() {
                Some(i) => {
                    2u8.hash(hasher);
                    i.hash(hasher);
                }
                None => {
                    3u8.hash(hasher);
                    self.as_f64().unwrap_or_default().to_bits().hash(hasher);
                }
            },
            Value::Text(s) => {
                4u8.hash(hasher);
                s.hash(hasher);
            }
            Value::Bytes(b) => {
                5u8.hash(hasher);
                b.hash(hasher);
            }
            Value::Json(j) => {
                6u8.hash(hasher);
                j.to_string().hash(hasher);
            }
            Value::Array(items) => {
                7u8.hash(hasher);
                items.len().hash(hasher);
                for item in items {
                    item.hash_into(hasher);
                }
            }
        }
    }
}

/// Hash a composite key.
#[must_use]
pub fn hash_key(values: &[Value]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    for value in values {
        value.hash_into(&mut hasher);
    }
    hasher.finish()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::BigInt(i) | Value::Timestamp(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_eq_crosses_numeric_types() {
        assert!(Value::BigInt(1).loose_eq(&Value::Double(1.0)));
        assert!(!Value::BigInt(1).loose_eq(&Value::Double(1.5)));
        assert!(!Value::Null.loose_eq(&Value::Null));
        assert!(Value::from("a").loose_eq(&Value::from("a")));
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        let mut values = vec![Value::from(3), Value::Null, Value::from(1)];
        values.sort_by(Value::sort_cmp);
        assert_eq!(values, vec![Value::Null, Value::from(1), Value::from(3)]);
    }

    #[test]
    fn test_hash_key_matches_loose_eq() {
        assert_eq!(
            hash_key(&[Value::BigInt(7)]),
            hash_key(&[Value::Double(7.0)])
        );
        assert_ne!(hash_key(&[Value::BigInt(7)]), hash_key(&[Value::from("7")]));
    }

    #[test]
    fn test_option_and_vec_conversions() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec![1, 2]),
            Value::Array(vec![Value::BigInt(1), Value::BigInt(2)])
        );
    }
}
