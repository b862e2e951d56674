//! Untyped rows read as tuples.

use crate::value::{FromValue, Value, ValueError};

/// A type built from the visible columns of one row.
///
/// Implemented for `Vec<Value>` and for tuples of up to six [`FromValue`]
/// elements, read left to right.
pub trait FromRow: Sized {
    fn from_row(row: &[Value]) -> Result<Self, ValueError>;
}

impl FromRow for Vec<Value> {
    fn from_row(row: &[Value]) -> Result<Self, ValueError> {
        Ok(row.to_vec())
    }
}

fn column<T: FromValue>(row: &[Value], ordinal: usize) -> Result<T, ValueError> {
    let value = row.get(ordinal).cloned().ok_or(ValueError::OutOfRange {
        expected: "row column",
        value: ordinal.to_string(),
    })?;
    T::from_value(value)
}

macro_rules! tuple_from_row {
    ($($name:ident : $ordinal:tt),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: &[Value]) -> Result<Self, ValueError> {
                Ok(($(column::<$name>(row, $ordinal)?,)+))
            }
        }
    };
}

tuple_from_row!(A: 0);
tuple_from_row!(A: 0, B: 1);
tuple_from_row!(A: 0, B: 1, C: 2);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_from_row!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_reads_in_order() {
        let row = [Value::Int(7), Value::Text("Ann".into()), Value::Null];
        let (id, name, city): (i64, String, Option<String>) = FromRow::from_row(&row).unwrap();
        assert_eq!((id, name.as_str(), city), (7, "Ann", None));
    }

    #[test]
    fn test_short_row_is_an_error() {
        let row = [Value::Int(7)];
        let err = <(i64, String)>::from_row(&row).unwrap_err();
        assert!(matches!(err, ValueError::OutOfRange { .. }));
    }
}
