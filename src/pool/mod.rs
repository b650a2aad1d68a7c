//! The connection pool: a fixed set of backend slots fed from one FIFO by a
//! dedicated dispatcher thread.
//!
//! ```rust,no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn demo() -> Result<(), sql_dispatch::SqlDispatchError> {
//! use std::time::Duration;
//! use sql_dispatch::prelude::*;
//!
//! let pool = ConnectionPool::new();
//! pool.start(4, ConnectionTarget::Sqlite(SqliteOptions::new("app.db".into())))?;
//! pool.wait_ready(Duration::from_secs(5)).await;
//!
//! let results = Results::<(i64,)>::shared();
//! pool.execute(Query::new("SELECT 1", &results)).await?;
//! assert_eq!(results.verify(), 0);
//! assert_eq!(results.get(0)?.0, 1);
//!
//! pool.terminate()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod dispatcher;
mod slot;

pub use config::{ConnectionTarget, PoolConfig, PoolOptions, ReconnectPolicy};
pub use slot::SlotState;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::Connector;
use crate::error::SqlDispatchError;
use crate::helpers::lock_unpoisoned;
use crate::query::Query;
use dispatcher::Dispatcher;
use slot::Slot;

const DISPATCH_THREAD_NAME: &str = "sql-dispatch";

struct PendingQueue {
    pending: VecDeque<Query>,
    accepting: bool,
}

/// State shared between caller threads and the dispatcher. The pending FIFO is the
/// only structure callers mutate; the rest is published by the dispatcher.
pub(crate) struct Shared {
    queue: Mutex<PendingQueue>,
    wakeup: Notify,
    ready: Notify,
    connected: AtomicUsize,
    slot_states: Mutex<Vec<SlotState>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(PendingQueue {
                pending: VecDeque::new(),
                accepting: false,
            }),
            wakeup: Notify::new(),
            ready: Notify::new(),
            connected: AtomicUsize::new(0),
            slot_states: Mutex::new(Vec::new()),
        }
    }

    fn try_push(&self, query: Query) -> Result<(), Query> {
        if self.connected.load(Ordering::Acquire) == 0 {
            return Err(query);
        }
        {
            let mut queue = lock_unpoisoned(&self.queue);
            if !queue.accepting {
                return Err(query);
            }
            if !query.sink().try_enqueue() {
                warn!(statement = query.statement(), "results already queued or executing");
                return Err(query);
            }
            queue.pending.push_back(query);
        }
        self.wakeup.notify_one();
        Ok(())
    }

    fn set_accepting(&self, accepting: bool) {
        lock_unpoisoned(&self.queue).accepting = accepting;
    }

    pub(crate) fn pop(&self) -> Option<Query> {
        lock_unpoisoned(&self.queue).pending.pop_front()
    }

    pub(crate) fn take_all(&self) -> Vec<Query> {
        lock_unpoisoned(&self.queue).pending.drain(..).collect()
    }

    pub(crate) fn pending_len(&self) -> usize {
        lock_unpoisoned(&self.queue).pending.len()
    }

    /// Snapshot slot states for `stats()` and readiness.
    pub(crate) fn publish(&self, slots: &[Slot]) {
        let states: Vec<SlotState> = slots.iter().map(Slot::state).collect();
        let connected = states.iter().filter(|s| s.is_connected()).count();
        *lock_unpoisoned(&self.slot_states) = states;
        let before = self.connected.swap(connected, Ordering::AcqRel);
        if before == 0 && connected > 0 {
            self.ready.notify_waiters();
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub slots: usize,
    pub idle: usize,
    pub busy: usize,
    pub connecting: usize,
    pub failed: usize,
    pub disconnected: usize,
    /// Queries accepted but not yet handed to a slot.
    pub queued: usize,
}

enum Lifecycle {
    Created,
    Running {
        thread: JoinHandle<()>,
        stop: CancellationToken,
    },
    Terminated,
}

/// Bounded set of backend connections serving queued queries.
///
/// `queue()` may be called from any thread. Completion hooks run on the pool's
/// dispatcher thread.
pub struct ConnectionPool {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    /// Open `max_concurrency` connections to `target` and start dispatching.
    ///
    /// Returns once the dispatcher is running; slots connect in the background, see
    /// [`is_ready`](Self::is_ready) and [`wait_ready`](Self::wait_ready).
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ConfigError` for invalid options and
    /// `SqlDispatchError::InvalidState` if the pool was already started.
    pub fn start(
        &self,
        max_concurrency: usize,
        target: ConnectionTarget,
    ) -> Result<(), SqlDispatchError> {
        let connector = target.connector()?;
        self.start_with(PoolOptions::new(max_concurrency), connector)
    }

    /// Start with explicit options and any [`Connector`].
    ///
    /// # Errors
    /// Same as [`start`](Self::start), plus `SqlDispatchError::Other` if the
    /// dispatcher thread or its runtime cannot be created.
    pub fn start_with(
        &self,
        options: PoolOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<(), SqlDispatchError> {
        options.validate()?;
        let mut lifecycle = lock_unpoisoned(&self.lifecycle);
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running { .. } => {
                return Err(SqlDispatchError::invalid_state("pool already started"));
            }
            Lifecycle::Terminated => {
                return Err(SqlDispatchError::invalid_state("pool was terminated"));
            }
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SqlDispatchError::Other(format!("dispatcher runtime: {e}")))?;

        let slots = options.max_concurrency;
        let db = connector.describe();
        let stop = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.shared),
            connector,
            options,
            stop.clone(),
        );
        self.shared.set_accepting(true);
        let thread = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || dispatcher.run(runtime))
            .map_err(|e| {
                self.shared.set_accepting(false);
                SqlDispatchError::Other(format!("failed to spawn dispatcher thread: {e}"))
            })?;

        info!(slots, db = %db, "connection pool started");
        *lifecycle = Lifecycle::Running { thread, stop };
        Ok(())
    }

    /// Submit `query` for execution. Never blocks on I/O.
    ///
    /// Returns `false` if the pool has no connected slot, is shutting down, or the
    /// query's results are already queued or executing. A rejected query is dropped
    /// and its hook never fires; use [`try_queue`](Self::try_queue) to get it back.
    pub fn queue(&self, query: Query) -> bool {
        self.try_queue(query).is_ok()
    }

    /// Like [`queue`](Self::queue), but hands a rejected query back to the caller.
    ///
    /// # Errors
    /// Returns the query unchanged when it was not accepted.
    pub fn try_queue(&self, query: Query) -> Result<(), Query> {
        self.shared.try_push(query)
    }

    /// Queue `query` and wait until its results are populated.
    ///
    /// Any hook already set on the query runs first.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::NotReady` if the pool rejected the query, and
    /// `SqlDispatchError::ConnectionError` if an earlier hook panicked before the
    /// completion could be signalled. Statement failures are reported through the
    /// results' status, not here.
    pub async fn execute(&self, mut query: Query) -> Result<(), SqlDispatchError> {
        let (tx, rx) = oneshot::channel();
        query.chain_hook(move || {
            let _ = tx.send(());
        });
        if self.try_queue(query).is_err() {
            return Err(SqlDispatchError::NotReady(
                "pool rejected the query".to_string(),
            ));
        }
        rx.await.map_err(|_| {
            SqlDispatchError::ConnectionError("completion signal dropped".to_string())
        })
    }

    /// True once at least one slot is connected and the pool accepts queries.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire) > 0
            && lock_unpoisoned(&self.shared.queue).accepting
    }

    /// Wait up to `timeout` for [`is_ready`](Self::is_ready).
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.shared.ready.notified();
                if self.is_ready() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let states = lock_unpoisoned(&self.shared.slot_states).clone();
        let count = |wanted: SlotState| states.iter().filter(|s| **s == wanted).count();
        PoolStats {
            slots: states.len(),
            idle: count(SlotState::Idle),
            busy: count(SlotState::Busy),
            connecting: count(SlotState::Connecting),
            failed: count(SlotState::Failed),
            disconnected: count(SlotState::Disconnected),
            queued: self.shared.pending_len(),
        }
    }

    /// Stop accepting queries, drain, and close every connection.
    ///
    /// Queries already queued are still dispatched and in-flight ones run to
    /// completion, bounded by the drain timeout; whatever remains after it resolves
    /// with a connection error and its hook fires. Blocks until the dispatcher thread
    /// has exited, so no hook runs after this returns.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::InvalidState` if the pool is not running, and
    /// `SqlDispatchError::Other` if the dispatcher thread panicked.
    pub fn terminate(&self) -> Result<(), SqlDispatchError> {
        let previous = {
            let mut lifecycle = lock_unpoisoned(&self.lifecycle);
            match *lifecycle {
                Lifecycle::Created => {
                    return Err(SqlDispatchError::invalid_state("pool was never started"));
                }
                Lifecycle::Terminated => {
                    return Err(SqlDispatchError::invalid_state("pool already terminated"));
                }
                Lifecycle::Running { .. } => {
                    std::mem::replace(&mut *lifecycle, Lifecycle::Terminated)
                }
            }
        };
        let Lifecycle::Running { thread, stop } = previous else {
            return Ok(());
        };

        self.shared.set_accepting(false);
        stop.cancel();
        self.shared.wakeup.notify_one();

        if thread.thread().id() == thread::current().id() {
            warn!("terminate called from a completion hook; dispatcher stops after this hook");
            return Ok(());
        }
        thread
            .join()
            .map_err(|_| SqlDispatchError::Other("dispatcher thread panicked".to_string()))?;
        info!("connection pool terminated");
        Ok(())
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        let running = matches!(
            *lock_unpoisoned(&self.lifecycle),
            Lifecycle::Running { .. }
        );
        if !running {
            return;
        }
        if let Err(error) = self.terminate() {
            warn!(error = %error, "terminate on drop failed");
        }
    }
}
