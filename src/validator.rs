//! Cacheable-value validation.

use crate::codec::CacheValue;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Loose truthiness, so predicates may return more than a plain `bool`.
///
/// Zero, NaN, empty strings, `false`, `None` and JSON `null` are falsy.
/// Everything else, including empty arrays and objects, is truthy.
pub trait Truthy {
    /// Returns whether the value counts as "yes".
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for &str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

impl Truthy for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }
}

macro_rules! impl_truthy_integer {
    ($($ty:ty),*) => {
        $(
            impl Truthy for $ty {
                fn is_truthy(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

impl_truthy_integer!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().map_or(false, Truthy::is_truthy)
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map_or(true, |f| f.is_truthy()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

impl Truthy for CacheValue {
    fn is_truthy(&self) -> bool {
        match self {
            CacheValue::Undefined => false,
            CacheValue::Json(value) => value.is_truthy(),
        }
    }
}

type Predicate = dyn Fn(&CacheValue) -> bool + Send + Sync;

/// Decides whether a value may be written to the store.
///
/// Clones share the same predicate.
#[derive(Clone)]
pub struct Validator {
    predicate: Arc<Predicate>,
    custom: bool,
}

impl Validator {
    /// Builds a validator from a caller-supplied predicate.
    ///
    /// Any truthy return permits storage.
    pub fn custom<F, R>(predicate: F) -> Self
    where
        F: Fn(&CacheValue) -> R + Send + Sync + 'static,
        R: Truthy,
    {
        Self {
            predicate: Arc::new(move |value| predicate(value).is_truthy()),
            custom: true,
        }
    }

    /// The default policy: anything but `Undefined` and `null`.
    pub fn is_defined(value: &CacheValue) -> bool {
        !value.is_undefined() && !value.is_null()
    }

    /// Evaluates the predicate.
    pub fn is_cacheable(&self, value: &CacheValue) -> bool {
        (self.predicate)(value)
    }

    /// Whether this validator was supplied by the caller.
    pub fn is_custom(&self) -> bool {
        self.custom
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            predicate: Arc::new(Validator::is_defined),
            custom: false,
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("custom", &self.custom)
            .finish()
    }
}
