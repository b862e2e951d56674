//! Runtime values exchanged between queries, bound parameters and result rows.
//!
//! [`Value`] is the single currency the compiler, providers and materializer
//! agree on. Native Rust types convert into it with `From`, and back out with
//! [`FromValue`]. [`SqlValue`] ties a native type to the [`TypeHint`] used when
//! a column is declared with it.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// A dynamically typed SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::Guid(_) => "guid",
        }
    }

    /// The type hint a value carries when nothing better is known.
    pub fn type_hint(&self) -> TypeHint {
        match self {
            Value::Null => TypeHint::Unknown,
            Value::Bool(_) => TypeHint::Bool,
            Value::Int(_) => TypeHint::Int,
            Value::Float(_) => TypeHint::Float,
            Value::Text(s) => TypeHint::Text {
                unicode: !s.is_ascii(),
            },
            Value::Bytes(_) => TypeHint::Binary,
            Value::Date(_) => TypeHint::Date,
            Value::Time(_) => TypeHint::Time,
            Value::DateTime(_) => TypeHint::DateTime,
            Value::Guid(_) => TypeHint::Guid,
        }
    }

    /// Convert into a native type.
    pub fn get<T: FromValue>(self) -> Result<T, ValueError> {
        T::from_value(self)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&hex::encode(b)),
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::Time(t) => serializer.collect_str(&t.format("%H:%M:%S%.f")),
            Value::DateTime(dt) => serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Guid(g) => serializer.collect_str(&g.hyphenated()),
        }
    }
}

/// Declared storage type of a column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeHint {
    #[default]
    Unknown,
    Bool,
    Int,
    Float,
    Decimal,
    Text {
        unicode: bool,
    },
    Binary,
    Date,
    Time,
    DateTime,
    Guid,
}

impl TypeHint {
    pub fn is_bool(&self) -> bool {
        matches!(self, TypeHint::Bool)
    }
}

/// Conversion failures between [`Value`] and native types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot convert {found} value to {expected}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unexpected NULL for non-nullable {expected}")]
    UnexpectedNull { expected: &'static str },

    #[error("value {value} is out of range for {expected}")]
    OutOfRange { expected: &'static str, value: String },

    #[error("cannot parse {text:?} as {expected}")]
    Parse { expected: &'static str, text: String },
}

impl ValueError {
    fn mismatch(expected: &'static str, found: &Value) -> Self {
        match found {
            Value::Null => ValueError::UnexpectedNull { expected },
            other => ValueError::Mismatch {
                expected,
                found: other.kind(),
            },
        }
    }
}

// =============================================================================
// Native -> Value
// =============================================================================

macro_rules! value_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

value_from! {
    bool => |v| Value::Bool(v),
    i64 => |v| Value::Int(v),
    i32 => |v| Value::Int(v as i64),
    i16 => |v| Value::Int(v as i64),
    u8 => |v| Value::Int(v as i64),
    u32 => |v| Value::Int(v as i64),
    f64 => |v| Value::Float(v),
    f32 => |v| Value::Float(v as f64),
    String => |v| Value::Text(v),
    &str => |v| Value::Text(v.to_string()),
    Vec<u8> => |v| Value::Bytes(v),
    &[u8] => |v| Value::Bytes(v.to_vec()),
    NaiveDate => |v| Value::Date(v),
    NaiveTime => |v| Value::Time(v),
    NaiveDateTime => |v| Value::DateTime(v),
    Uuid => |v| Value::Guid(v),
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Value -> Native
// =============================================================================

/// Conversion out of a [`Value`].
///
/// Conversions are lenient where drivers commonly widen types: integers read
/// as booleans, ISO text read as dates, 16-byte blobs read as GUIDs.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(n) => Ok(n != 0),
            Value::Text(ref s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::Text(ref s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(ValueError::mismatch("bool", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Int(n) => Ok(n),
            Value::Bool(b) => Ok(b as i64),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
            other => Err(ValueError::mismatch("i64", &other)),
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ValueError> {
                    let wide = i64::from_value(value).map_err(|e| match e {
                        ValueError::Mismatch { found, .. } => ValueError::Mismatch {
                            expected: stringify!($ty),
                            found,
                        },
                        ValueError::UnexpectedNull { .. } => ValueError::UnexpectedNull {
                            expected: stringify!($ty),
                        },
                        other => other,
                    })?;
                    <$ty>::try_from(wide).map_err(|_| ValueError::OutOfRange {
                        expected: stringify!($ty),
                        value: wide.to_string(),
                    })
                }
            }
        )*
    };
}

narrow_int!(i32, i16, u8, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(n) => Ok(n as f64),
            Value::Text(ref s) => s.parse().map_err(|_| ValueError::Parse {
                expected: "f64",
                text: s.clone(),
            }),
            other => Err(ValueError::mismatch("f64", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Guid(g) => Ok(g.hyphenated().to_string()),
            other => Err(ValueError::mismatch("string", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Guid(g) => Ok(g.as_bytes().to_vec()),
            other => Err(ValueError::mismatch("bytes", &other)),
        }
    }
}

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Date(d) => Ok(d),
            Value::DateTime(dt) => Ok(dt.date()),
            Value::Text(ref s) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ValueError::Parse {
                    expected: "date",
                    text: s.clone(),
                })
            }
            other => Err(ValueError::mismatch("date", &other)),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Time(t) => Ok(t),
            Value::DateTime(dt) => Ok(dt.time()),
            Value::Text(ref s) => {
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| ValueError::Parse {
                    expected: "time",
                    text: s.clone(),
                })
            }
            other => Err(ValueError::mismatch("time", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            Value::Text(ref s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .ok_or_else(|| ValueError::Parse {
                    expected: "datetime",
                    text: s.clone(),
                }),
            other => Err(ValueError::mismatch("datetime", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Guid(g) => Ok(g),
            Value::Text(ref s) => Uuid::parse_str(s).map_err(|_| ValueError::Parse {
                expected: "guid",
                text: s.clone(),
            }),
            Value::Bytes(ref b) => Uuid::from_slice(b).map_err(|_| ValueError::Parse {
                expected: "guid",
                text: hex::encode(b),
            }),
            other => Err(ValueError::mismatch("guid", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// =============================================================================
// Column-declarable types
// =============================================================================

/// A native type that can back a mapped column.
pub trait SqlValue: FromValue + Into<Value> + Send + Sync + 'static {
    const HINT: TypeHint;
    const NULLABLE: bool = false;
}

macro_rules! sql_value {
    ($($ty:ty => $hint:expr),* $(,)?) => {
        $(
            impl SqlValue for $ty {
                const HINT: TypeHint = $hint;
            }
        )*
    };
}

sql_value! {
    bool => TypeHint::Bool,
    i64 => TypeHint::Int,
    i32 => TypeHint::Int,
    i16 => TypeHint::Int,
    u8 => TypeHint::Int,
    u32 => TypeHint::Int,
    f64 => TypeHint::Float,
    f32 => TypeHint::Float,
    String => TypeHint::Text { unicode: true },
    Vec<u8> => TypeHint::Binary,
    NaiveDate => TypeHint::Date,
    NaiveTime => TypeHint::Time,
    NaiveDateTime => TypeHint::DateTime,
    Uuid => TypeHint::Guid,
}

impl<T: SqlValue> SqlValue for Option<T> {
    const HINT: TypeHint = T::HINT;
    const NULLABLE: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_from_int() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::Int(0)).unwrap());
    }

    #[test]
    fn test_null_into_required_field() {
        let err = i64::from_value(Value::Null).unwrap_err();
        assert_eq!(err, ValueError::UnexpectedNull { expected: "i64" });
    }

    #[test]
    fn test_narrowing_out_of_range() {
        let err = u8::from_value(Value::Int(300)).unwrap_err();
        assert!(matches!(err, ValueError::OutOfRange { expected: "u8", .. }));
        assert_eq!(i32::from_value(Value::Int(42)).unwrap(), 42);
    }

    #[test]
    fn test_datetime_from_sqlite_text() {
        let dt = NaiveDateTime::from_value(Value::Text("2024-03-01 10:15:30.250".into())).unwrap();
        assert_eq!(dt.format("%H:%M:%S%.3f").to_string(), "10:15:30.250");
    }

    #[test]
    fn test_guid_from_text_and_bytes() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_value(Value::Text(id.to_string())).unwrap(), id);
        assert_eq!(Uuid::from_value(Value::Bytes(id.as_bytes().to_vec())).unwrap(), id);
    }

    #[test]
    fn test_option_roundtrip() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(5i32)), Value::Int(5));
    }

    #[test]
    fn test_mismatch_names_both_kinds() {
        let err = NaiveDate::from_value(Value::Int(3)).unwrap_err();
        assert_eq!(err.to_string(), "cannot convert int value to date");
    }

    #[test]
    fn test_json_serialization() {
        let json = serde_json::to_string(&vec![
            Value::Int(1),
            Value::Bytes(vec![0xde, 0xad]),
            Value::Null,
        ])
        .unwrap();
        assert_eq!(json, r#"[1,"dead",null]"#);
    }

    #[test]
    fn test_type_hints() {
        assert_eq!(<Option<i32> as SqlValue>::HINT, TypeHint::Int);
        assert!(<Option<i32> as SqlValue>::NULLABLE);
        assert!(!<String as SqlValue>::NULLABLE);
    }
}
