use std::fmt;
use std::sync::Arc;

use crate::parameters::Parameters;
use crate::results::{Completion, ResultSink, Results};
use crate::typed::RowTuple;
use crate::types::RowValues;

/// One-shot continuation invoked on the dispatcher thread once results are populated.
pub type CompletionHook = Box<dyn FnOnce() + Send + 'static>;

/// A statement, its parameters, the sink that receives the outcome and an optional
/// completion hook, bundled for submission to a
/// [`ConnectionPool`](crate::pool::ConnectionPool).
///
/// The statement text is opaque; placeholders use the backend's native syntax
/// (`$1` for Postgres, `?1` for `SQLite`):
/// ```rust
/// use sql_dispatch::prelude::*;
///
/// let results = Results::<(i64, String)>::shared();
/// let query = Query::new("SELECT id, name FROM users WHERE id = $1", &results)
///     .parameters(Parameters::new((7_i64,)))
///     .on_complete(|| println!("done"));
/// assert_eq!(query.statement(), "SELECT id, name FROM users WHERE id = $1");
/// ```
pub struct Query {
    statement: Arc<str>,
    parameters: Option<Arc<[RowValues]>>,
    results: Arc<dyn ResultSink>,
    on_complete: Option<CompletionHook>,
}

impl Query {
    #[must_use]
    pub fn new<R: RowTuple>(statement: impl Into<Arc<str>>, results: &Arc<Results<R>>) -> Self {
        let sink: Arc<dyn ResultSink> = Arc::clone(results) as Arc<dyn ResultSink>;
        Self {
            statement: statement.into(),
            parameters: None,
            results: sink,
            on_complete: None,
        }
    }

    #[must_use]
    pub fn parameters<P>(mut self, parameters: Parameters<P>) -> Self {
        self.parameters = Some(parameters.shared_values());
        self
    }

    /// Set the hook fired after the results are populated. It runs on the dispatcher
    /// thread, so it should hand work off (wake a task, send on a channel) rather than
    /// block.
    #[must_use]
    pub fn on_complete(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    #[must_use]
    pub fn has_hook(&self) -> bool {
        self.on_complete.is_some()
    }

    pub(crate) fn sink(&self) -> &dyn ResultSink {
        self.results.as_ref()
    }

    fn take_hook(&mut self) -> Option<CompletionHook> {
        self.on_complete.take()
    }

    /// Run `hook` after whatever hook the caller set.
    pub(crate) fn chain_hook(&mut self, hook: impl FnOnce() + Send + 'static) {
        let previous = self.on_complete.take();
        self.on_complete = Some(Box::new(move || {
            if let Some(previous) = previous {
                previous();
            }
            hook();
        }));
    }

    /// The pieces an execution needs, detached from the sink and hook.
    pub(crate) fn work(&self) -> (Arc<str>, Arc<[RowValues]>) {
        let params = self
            .parameters
            .clone()
            .unwrap_or_else(|| Arc::from(Vec::new()));
        (Arc::clone(&self.statement), params)
    }

    /// Populate the sink and hand back the hook for the dispatcher to fire. Consumes
    /// the query so the hook cannot be fired twice.
    pub(crate) fn finish(mut self, completion: Completion) -> Option<CompletionHook> {
        self.results.complete(completion);
        self.take_hook()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("statement", &self.statement)
            .field(
                "parameters",
                &self.parameters.as_ref().map_or(0, |p| p.len()),
            )
            .field("has_hook", &self.on_complete.is_some())
            .finish_non_exhaustive()
    }
}
