//! Tuple implementations of [`ParamList`] and [`RowTuple`] up to arity 12.

use crate::error::SqlDispatchError;
use crate::types::{ColumnType, RowValues};

use super::traits::{ParamList, RowTuple, SqlColumn, SqlParam};

macro_rules! impl_type_lists {
    ($($name:ident : $idx:tt),*) => {
        impl<$($name: SqlParam),*> ParamList for ($($name,)*) {
            fn declared_types() -> Vec<ColumnType> {
                vec![$(<$name as SqlParam>::COLUMN_TYPE),*]
            }

            #[allow(clippy::unused_unit)]
            fn to_row_values(&self) -> Vec<RowValues> {
                vec![$(self.$idx.to_row_value()),*]
            }
        }

        impl<$($name: SqlColumn + Send + Sync + 'static),*> RowTuple for ($($name,)*) {
            fn column_types() -> Vec<ColumnType> {
                vec![$(<$name as SqlColumn>::COLUMN_TYPE),*]
            }

            #[allow(unused_variables)]
            fn decode(values: &[RowValues]) -> Result<Self, (usize, SqlDispatchError)> {
                let expected = Self::column_types().len();
                if values.len() != expected {
                    return Err((
                        0,
                        SqlDispatchError::ExecutionError(format!(
                            "row has {} values, expected {expected}",
                            values.len()
                        )),
                    ));
                }
                Ok(($(
                    <$name as SqlColumn>::from_row_value(&values[$idx])
                        .map_err(|err| ($idx + 1, err))?,
                )*))
            }
        }
    };
}

impl_type_lists!();
impl_type_lists!(A: 0);
impl_type_lists!(A: 0, B: 1);
impl_type_lists!(A: 0, B: 1, C: 2);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10);
impl_type_lists!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10, L: 11);
