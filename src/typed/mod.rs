//! Static type lists for parameters and result rows.
//!
//! A statement's parameters are declared as a tuple of [`SqlParam`] values and its
//! result row as a tuple of [`SqlColumn`] types. Nothing checks these against the
//! statement text; the parameter side surfaces mismatches as backend errors and the
//! result side is compared against the backend's reported columns by
//! [`Results::verify`](crate::results::Results::verify).

mod macros;
mod traits;

pub use traits::{ParamList, RowTuple, SqlColumn, SqlParam};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnType, RowValues};

    #[test]
    fn tuple_declares_types_in_order() {
        assert_eq!(
            <(i64, String, Option<bool>) as RowTuple>::column_types(),
            vec![ColumnType::Int, ColumnType::Text, ColumnType::Bool]
        );
        assert!(<() as RowTuple>::column_types().is_empty());
    }

    #[test]
    fn decode_reports_one_indexed_failing_column() {
        let row = vec![RowValues::Int(1), RowValues::Int(2)];
        let err = <(i64, String)>::decode(&row).unwrap_err();
        assert_eq!(err.0, 2);

        let ok = <(i64, i64)>::decode(&row).unwrap();
        assert_eq!(ok, (1, 2));
    }

    #[test]
    fn params_flatten_to_row_values() {
        let values = (7_i64, "abc", None::<f64>).to_row_values();
        assert_eq!(
            values,
            vec![RowValues::Int(7), RowValues::Text("abc".into()), RowValues::Null]
        );
        assert_eq!(
            <(i64, &str, Option<f64>)>::declared_types(),
            vec![ColumnType::Int, ColumnType::Text, ColumnType::Float]
        );
    }
}
