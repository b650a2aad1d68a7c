//! Conversions between Rust values and [`RowValues`] for statically declared
//! parameter and column lists.

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqlDispatchError;
use crate::types::{ColumnType, RowValues};

/// A Rust value that can be bound to a positional placeholder.
pub trait SqlParam {
    /// The type this parameter is declared as.
    const COLUMN_TYPE: ColumnType;

    fn to_row_value(&self) -> RowValues;
}

/// A Rust value that can be decoded from one result column.
pub trait SqlColumn: Sized {
    /// The type a column must report to satisfy this declaration.
    const COLUMN_TYPE: ColumnType;

    /// Decode a single backend value.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ExecutionError` when the value has an incompatible
    /// representation (including NULL for non-`Option` declarations).
    fn from_row_value(value: &RowValues) -> Result<Self, SqlDispatchError>;
}

/// Ordered, fixed-shape list of parameters, implemented for tuples.
pub trait ParamList {
    fn declared_types() -> Vec<ColumnType>;

    fn to_row_values(&self) -> Vec<RowValues>;
}

/// Ordered, fixed-shape list of result columns, implemented for tuples.
pub trait RowTuple: Sized + Send + Sync + 'static {
    fn column_types() -> Vec<ColumnType>;

    /// Decode one row. On failure the error carries the 1-indexed column that failed.
    ///
    /// # Errors
    /// Returns the failing column position together with the conversion error.
    fn decode(values: &[RowValues]) -> Result<Self, (usize, SqlDispatchError)>;
}

fn mismatch(expected: &ColumnType, value: &RowValues) -> SqlDispatchError {
    SqlDispatchError::ExecutionError(format!(
        "cannot decode {value:?} as {expected}"
    ))
}

macro_rules! impl_sql_value {
    ($ty:ty, $column_type:expr, |$v:ident| $to:expr, |$r:ident| $from:expr) => {
        impl SqlParam for $ty {
            const COLUMN_TYPE: ColumnType = $column_type;

            fn to_row_value(&self) -> RowValues {
                let $v = self;
                $to
            }
        }

        impl SqlColumn for $ty {
            const COLUMN_TYPE: ColumnType = $column_type;

            fn from_row_value(value: &RowValues) -> Result<Self, SqlDispatchError> {
                let $r = value;
                let decoded: Option<$ty> = $from;
                decoded.ok_or_else(|| mismatch(&$column_type, value))
            }
        }
    };
}

impl_sql_value!(i64, ColumnType::Int, |v| RowValues::Int(*v), |r| r.as_int().copied());
impl_sql_value!(i32, ColumnType::Int, |v| RowValues::Int(i64::from(*v)), |r| r
    .as_int()
    .and_then(|i| i32::try_from(*i).ok()));
impl_sql_value!(i16, ColumnType::Int, |v| RowValues::Int(i64::from(*v)), |r| r
    .as_int()
    .and_then(|i| i16::try_from(*i).ok()));
impl_sql_value!(f64, ColumnType::Float, |v| RowValues::Float(*v), |r| r.as_float());
impl_sql_value!(f32, ColumnType::Float, |v| RowValues::Float(f64::from(*v)), |r| r
    .as_float()
    .map(|f| f as f32));
impl_sql_value!(bool, ColumnType::Bool, |v| RowValues::Bool(*v), |r| r.as_bool());
impl_sql_value!(String, ColumnType::Text, |v| RowValues::Text(v.clone()), |r| r
    .as_text()
    .map(str::to_owned));
impl_sql_value!(NaiveDateTime, ColumnType::Timestamp, |v| RowValues::Timestamp(*v), |r| r
    .as_timestamp());
impl_sql_value!(JsonValue, ColumnType::Json, |v| RowValues::JSON(v.clone()), |r| r.as_json());
impl_sql_value!(Vec<u8>, ColumnType::Blob, |v| RowValues::Blob(v.clone()), |r| r
    .as_blob()
    .map(<[u8]>::to_vec));

impl SqlParam for &str {
    const COLUMN_TYPE: ColumnType = ColumnType::Text;

    fn to_row_value(&self) -> RowValues {
        RowValues::Text((*self).to_owned())
    }
}

impl SqlParam for &[u8] {
    const COLUMN_TYPE: ColumnType = ColumnType::Blob;

    fn to_row_value(&self) -> RowValues {
        RowValues::Blob(self.to_vec())
    }
}

impl<T: SqlParam> SqlParam for Option<T> {
    const COLUMN_TYPE: ColumnType = T::COLUMN_TYPE;

    fn to_row_value(&self) -> RowValues {
        self.as_ref().map_or(RowValues::Null, SqlParam::to_row_value)
    }
}

impl<T: SqlColumn> SqlColumn for Option<T> {
    const COLUMN_TYPE: ColumnType = T::COLUMN_TYPE;

    fn from_row_value(value: &RowValues) -> Result<Self, SqlDispatchError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_decodes_null_but_plain_does_not() {
        assert_eq!(Option::<i64>::from_row_value(&RowValues::Null).unwrap(), None);
        assert!(i64::from_row_value(&RowValues::Null).is_err());
        assert_eq!(
            Option::<String>::from_row_value(&RowValues::Text("x".into())).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn narrow_ints_reject_overflow() {
        assert_eq!(i32::from_row_value(&RowValues::Int(7)).unwrap(), 7);
        assert!(i16::from_row_value(&RowValues::Int(i64::from(i32::MAX))).is_err());
    }

    #[test]
    fn json_decodes_from_text() {
        let decoded = JsonValue::from_row_value(&RowValues::Text("{\"a\":1}".into())).unwrap();
        assert_eq!(decoded["a"], 1);
    }

    #[test]
    fn params_carry_declared_type() {
        assert_eq!(<&str as SqlParam>::COLUMN_TYPE, ColumnType::Text);
        assert_eq!(<Option<bool> as SqlParam>::COLUMN_TYPE, ColumnType::Bool);
        assert_eq!(None::<i64>.to_row_value(), RowValues::Null);
    }
}
