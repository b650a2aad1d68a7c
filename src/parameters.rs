use std::marker::PhantomData;
use std::sync::Arc;

use crate::typed::ParamList;
use crate::types::{ColumnType, RowValues};

/// Positional parameters for one statement.
///
/// Values are converted to [`RowValues`] when the container is built and never change
/// afterwards, so the dispatcher can read them from its own thread without
/// coordination:
/// ```rust
/// use sql_dispatch::prelude::*;
///
/// let params = Parameters::new((42_i64, "127.0.0.1", None::<String>));
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug)]
pub struct Parameters<P = Vec<RowValues>> {
    values: Arc<[RowValues]>,
    declared: Vec<ColumnType>,
    _list: PhantomData<fn() -> P>,
}

impl<P> Clone for Parameters<P> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            declared: self.declared.clone(),
            _list: PhantomData,
        }
    }
}

impl<P: ParamList> Parameters<P> {
    #[must_use]
    pub fn new(list: P) -> Self {
        Self {
            values: list.to_row_values().into(),
            declared: P::declared_types(),
            _list: PhantomData,
        }
    }
}

impl Parameters<Vec<RowValues>> {
    /// Build parameters from values whose shape is only known at runtime.
    #[must_use]
    pub fn from_values(values: Vec<RowValues>) -> Self {
        let declared = values.iter().map(RowValues::column_type).collect();
        Self {
            values: values.into(),
            declared,
            _list: PhantomData,
        }
    }
}

impl<P> Parameters<P> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    /// The declared type of each placeholder, in order.
    #[must_use]
    pub fn declared_types(&self) -> &[ColumnType] {
        &self.declared
    }

    pub(crate) fn shared_values(&self) -> Arc<[RowValues]> {
        Arc::clone(&self.values)
    }
}
