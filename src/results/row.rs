use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Read-only view of one verified, decoded row.
///
/// The view shares the decoded row buffer with its [`Results`](crate::results::Results),
/// so it stays cheap to clone and hand around while the caller inspects the data.
pub struct RowView<R> {
    rows: Arc<[R]>,
    index: usize,
}

impl<R> RowView<R> {
    pub(super) fn new(rows: Arc<[R]>, index: usize) -> Self {
        Self { rows, index }
    }

    /// Position of this row within its result.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<R> Clone for RowView<R> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            index: self.index,
        }
    }
}

impl<R> Deref for RowView<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.rows[self.index]
    }
}

impl<R: fmt::Debug> fmt::Debug for RowView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowView")
            .field("index", &self.index)
            .field("row", &**self)
            .finish()
    }
}
