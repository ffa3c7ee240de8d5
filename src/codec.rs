//! Value encoding for the store.
//!
//! Values are stored as JSON text. JSON has no spelling for "no value at all",
//! so [`CacheValue::Undefined`] is written as the JSON string `"undefined"`
//! and reads back as that string, not as `Undefined`.

use crate::Result;
use serde_json::Value;
use std::fmt;

/// The text stored for [`CacheValue::Undefined`].
const UNDEFINED_SENTINEL: &str = "\"undefined\"";

/// A value handed to the store for writing.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// The absent-value marker. Distinct from JSON `null`.
    Undefined,
    /// Any JSON-representable value, including `null`.
    Json(Value),
}

impl CacheValue {
    /// Returns the JSON payload, or `None` for `Undefined`.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CacheValue::Undefined => None,
            CacheValue::Json(value) => Some(value),
        }
    }

    /// Whether this is the absent-value marker.
    pub fn is_undefined(&self) -> bool {
        matches!(self, CacheValue::Undefined)
    }

    /// Whether this is JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Json(Value::Null))
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::Undefined => f.write_str("undefined"),
            CacheValue::Json(Value::String(s)) => f.write_str(s),
            CacheValue::Json(value) => write!(f, "{}", value),
        }
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        CacheValue::Json(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Json(Value::String(value))
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Json(Value::Bool(value))
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Json(Value::from(value))
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CacheValue {
                fn from(value: $ty) -> Self {
                    CacheValue::Json(Value::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => CacheValue::Json(Value::Null),
        }
    }
}

/// Encodes a value into the string form written to the backend.
pub fn encode(value: &CacheValue) -> Result<String> {
    match value {
        CacheValue::Undefined => Ok(UNDEFINED_SENTINEL.to_string()),
        CacheValue::Json(value) => Ok(serde_json::to_string(value)?),
    }
}

/// Decodes a stored string back into a JSON value.
pub fn decode(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(text)?)
}
