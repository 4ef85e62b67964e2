use std::fmt;

use serde::Serialize;

use crate::error::{QuarryError, QuarryResult};

/// A single SQL value, used both for bound parameters and decoded columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Storage class name, used in decode errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Bool(_) => "BOOLEAN",
        }
    }

    pub(crate) fn to_log_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_owned(),
            Value::Int(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(v) => format!("'{}'", v),
            Value::Bool(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bool(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Int(i64::from(value))
            }
        })*
    };
}

impl_from_int!(i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Real(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a decoded column into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> QuarryResult<Self>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> QuarryResult<T> {
    Err(QuarryError::Decode {
        expected,
        found: value.type_name(),
    })
}

impl FromValue for Value {
    fn from_value(value: Value) -> QuarryResult<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> QuarryResult<Self> {
        match value {
            Value::Int(v) => Ok(v),
            Value::Bool(v) => Ok(i64::from(v)),
            Value::Real(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
            other => mismatch("i64", &other),
        }
    }
}

macro_rules! impl_from_value_narrow {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            fn from_value(value: Value) -> QuarryResult<Self> {
                let found = value.type_name();
                let wide = i64::from_value(value)?;
                <$ty>::try_from(wide).map_err(|_| QuarryError::Decode {
                    expected: stringify!($ty),
                    found,
                })
            }
        })*
    };
}

impl_from_value_narrow!(i16, i32, u8, u16, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> QuarryResult<Self> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> QuarryResult<Self> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> QuarryResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            other => mismatch("bool", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> QuarryResult<Self> {
        match value {
            Value::Text(v) => Ok(v),
            other => mismatch("String", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Positional reader over one entity's slice of a row.
///
/// Used by `#[derive(Entity)]` to rebuild an entity in column order.
pub struct ValueReader {
    target: &'static str,
    expected: usize,
    values: std::vec::IntoIter<Value>,
}

impl ValueReader {
    pub fn new(target: &'static str, expected: usize, values: Vec<Value>) -> QuarryResult<Self> {
        if values.len() != expected {
            return Err(QuarryError::ArityMismatch {
                target,
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            target,
            expected,
            values: values.into_iter(),
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next<T: FromValue>(&mut self) -> QuarryResult<T> {
        let value = self.values.next().ok_or(QuarryError::ArityMismatch {
            target: self.target,
            expected: self.expected,
            found: self.expected - self.values.len(),
        })?;
        T::from_value(value)
    }
}
