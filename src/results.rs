//! Typed result sinks.
//!
//! A [`Results`] is created by the caller, attached to a [`Query`](crate::query::Query)
//! and filled in exactly once by the dispatcher. Rows only become readable after
//! [`Results::verify`] has confirmed that the declared row tuple matches what the
//! backend actually returned.

mod row;
mod status;

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use tracing::warn;

pub use row::RowView;
pub use status::{Completion, Status};

use crate::error::SqlDispatchError;
use crate::helpers::lock_unpoisoned;
use crate::typed::RowTuple;
use crate::types::{ColumnInfo, ColumnType};

/// Lifecycle of a [`Results`] sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsState {
    Empty,
    Queued,
    Executing,
    Completed,
}

/// The dispatcher's view of a result sink, independent of the declared row type.
pub(crate) trait ResultSink: Send + Sync {
    /// Move an `Empty` or `Completed` sink to `Queued`. Returns `false`, leaving the
    /// sink untouched, if it is already queued or executing.
    fn try_enqueue(&self) -> bool;

    fn mark_executing(&self);

    fn complete(&self, completion: Completion);
}

enum Verification<R> {
    Mismatch(i32),
    Rows(Arc<[R]>),
}

struct ResultsInner<R> {
    state: ResultsState,
    completion: Option<Completion>,
    verification: Option<Verification<R>>,
}

impl<R> ResultsInner<R> {
    fn clear(&mut self) {
        self.state = ResultsState::Empty;
        self.completion = None;
        self.verification = None;
    }
}

/// Result sink for statements whose rows decode into `R`.
///
/// ```rust
/// use std::sync::Arc;
/// use sql_dispatch::prelude::*;
///
/// let results: Arc<Results<(i64, String)>> = Results::shared();
/// assert_eq!(results.state(), ResultsState::Empty);
/// assert!(results.status().is_none());
/// ```
pub struct Results<R> {
    inner: Mutex<ResultsInner<R>>,
    _row: PhantomData<fn() -> R>,
}

impl<R: RowTuple> Default for Results<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RowTuple> Results<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ResultsInner {
                state: ResultsState::Empty,
                completion: None,
                verification: None,
            }),
            _row: PhantomData,
        }
    }

    /// Convenience for the common case of sharing the sink with a query.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[must_use]
    pub fn state(&self) -> ResultsState {
        lock_unpoisoned(&self.inner).state
    }

    /// Execution status, or `None` until the statement has completed.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        lock_unpoisoned(&self.inner)
            .completion
            .as_ref()
            .map(|c| c.status.clone())
    }

    /// Number of rows the backend returned.
    #[must_use]
    pub fn rows(&self) -> usize {
        lock_unpoisoned(&self.inner)
            .completion
            .as_ref()
            .map_or(0, |c| c.rows.len())
    }

    /// Rows affected by a DML statement; for row-returning statements, the row count.
    #[must_use]
    pub fn affected_rows(&self) -> usize {
        lock_unpoisoned(&self.inner)
            .completion
            .as_ref()
            .map_or(0, |c| c.affected_rows)
    }

    /// Columns as reported by the backend.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnInfo> {
        lock_unpoisoned(&self.inner)
            .completion
            .as_ref()
            .map(|c| c.columns.clone())
            .unwrap_or_default()
    }

    /// Compare the declared row tuple against the columns the backend reported.
    ///
    /// Returns `0` when every column matches (and every row decoded), `-1` when the
    /// column counts differ, otherwise the 1-indexed position of the first
    /// mismatching column. Once the statement has completed the outcome is cached, so
    /// repeated calls return the same value until [`Results::reset`].
    ///
    /// Before the statement completes there are no columns to compare, so a
    /// non-empty tuple also reports `-1`. That answer is not cached; check
    /// [`Results::state`] or [`Results::status`] to tell the two apart.
    pub fn verify(&self) -> i32 {
        let mut inner = lock_unpoisoned(&self.inner);
        match &inner.verification {
            Some(Verification::Mismatch(code)) => return *code,
            Some(Verification::Rows(_)) => return 0,
            None => {}
        }

        let declared = R::column_types();
        let Some(completion) = inner.completion.as_ref() else {
            if declared.is_empty() {
                return 0;
            }
            warn!(
                declared = declared.len(),
                "verify called before the statement completed"
            );
            return -1;
        };

        let verification = check_columns::<R>(&declared, completion);
        let code = match &verification {
            Verification::Mismatch(code) => *code,
            Verification::Rows(_) => 0,
        };
        inner.verification = Some(verification);
        code
    }

    /// Typed view of row `index`.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::InvalidState` unless the statement completed
    /// successfully and [`Results::verify`] returned `0`, and
    /// `SqlDispatchError::RowOutOfRange` for an index past the last row.
    pub fn get(&self, index: usize) -> Result<RowView<R>, SqlDispatchError> {
        let rows = self.verified_rows()?;
        if index >= rows.len() {
            return Err(SqlDispatchError::RowOutOfRange {
                index,
                rows: rows.len(),
            });
        }
        Ok(RowView::new(rows, index))
    }

    /// All verified rows, decoded.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::InvalidState` under the same conditions as [`Results::get`].
    pub fn verified_rows(&self) -> Result<Arc<[R]>, SqlDispatchError> {
        let inner = lock_unpoisoned(&self.inner);
        if inner.state != ResultsState::Completed {
            return Err(SqlDispatchError::invalid_state(format!(
                "row access while results are {:?}",
                inner.state
            )));
        }
        if let Some(completion) = &inner.completion
            && !completion.status.is_success()
        {
            return Err(SqlDispatchError::invalid_state(format!(
                "row access after unsuccessful status: {}",
                completion.status
            )));
        }
        match &inner.verification {
            Some(Verification::Rows(rows)) => Ok(Arc::clone(rows)),
            Some(Verification::Mismatch(code)) => Err(SqlDispatchError::invalid_state(format!(
                "row access after verify() returned {code}"
            ))),
            None => Err(SqlDispatchError::invalid_state(
                "row access before verify()",
            )),
        }
    }

    /// Return the sink to `Empty` so it can be attached to another query.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::InvalidState` while the sink is queued or executing.
    pub fn reset(&self) -> Result<(), SqlDispatchError> {
        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            ResultsState::Queued | ResultsState::Executing => Err(
                SqlDispatchError::invalid_state(format!("cannot reset results while {:?}", inner.state)),
            ),
            ResultsState::Empty | ResultsState::Completed => {
                inner.clear();
                Ok(())
            }
        }
    }
}

fn check_columns<R: RowTuple>(
    declared: &[ColumnType],
    completion: &Completion,
) -> Verification<R> {
    let actual = &completion.columns;
    if declared.len() != actual.len() {
        return Verification::Mismatch(-1);
    }
    if let Some(position) = declared
        .iter()
        .zip(actual)
        .position(|(want, got)| !want.accepts(&got.column_type))
    {
        return Verification::Mismatch(column_code(position + 1));
    }
    if !completion.status.is_success() {
        return Verification::Rows(Arc::from(Vec::new()));
    }

    let mut decoded = Vec::with_capacity(completion.rows.len());
    for row in &completion.rows {
        match R::decode(row) {
            Ok(value) => decoded.push(value),
            Err((0, _)) => return Verification::Mismatch(-1),
            Err((column, _)) => return Verification::Mismatch(column_code(column)),
        }
    }
    Verification::Rows(decoded.into())
}

fn column_code(position: usize) -> i32 {
    i32::try_from(position).unwrap_or(i32::MAX)
}

impl<R: RowTuple> ResultSink for Results<R> {
    fn try_enqueue(&self) -> bool {
        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            ResultsState::Queued | ResultsState::Executing => false,
            ResultsState::Empty | ResultsState::Completed => {
                inner.clear();
                inner.state = ResultsState::Queued;
                true
            }
        }
    }

    fn mark_executing(&self) {
        lock_unpoisoned(&self.inner).state = ResultsState::Executing;
    }

    fn complete(&self, completion: Completion) {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.completion = Some(completion);
        inner.verification = None;
        inner.state = ResultsState::Completed;
    }
}
