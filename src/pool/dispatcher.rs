//! The single dispatch loop that owns every slot.
//!
//! All slot activity (connects, reconnect timers, statement executions) runs as
//! futures multiplexed on one current-thread runtime, on one dedicated OS thread.
//! Caller threads only touch the pending FIFO in [`Shared`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::runtime::Runtime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Shared;
use super::config::PoolOptions;
use super::slot::{Slot, SlotState};
use crate::backend::{BackendConnection, BackendFailure, BackendResponse, Connector, completion_from};
use crate::error::SqlDispatchError;
use crate::query::Query;
use crate::results::Completion;

/// How long interrupted executions get to roll back once the drain timeout passes.
const ABORT_GRACE: Duration = Duration::from_secs(2);
/// Bound on waiting for blocking work a backend could not interrupt at exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type Execution = (
    usize,
    Box<dyn BackendConnection>,
    Result<BackendResponse, BackendFailure>,
);
type Connection = (usize, Result<Box<dyn BackendConnection>, SqlDispatchError>);

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    options: PoolOptions,
    stop: CancellationToken,
    slots: Vec<Slot>,
    executing: FuturesUnordered<BoxFuture<'static, Execution>>,
    connecting: FuturesUnordered<BoxFuture<'static, Connection>>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
        stop: CancellationToken,
    ) -> Self {
        let slots = (0..options.max_concurrency).map(|_| Slot::new()).collect();
        Self {
            shared,
            connector,
            options,
            stop,
            slots,
            executing: FuturesUnordered::new(),
            connecting: FuturesUnordered::new(),
        }
    }

    /// Thread body. Returns once the pool has drained (or the drain deadline passed)
    /// and the runtime, with any driver or blocking tasks it spawned, is shut down.
    pub(crate) fn run(mut self, runtime: Runtime) {
        runtime.block_on(self.run_loop());
        drop(self);
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
    }

    async fn run_loop(&mut self) {
        info!(
            slots = self.slots.len(),
            backend = %self.connector.database_type(),
            db = %self.connector.describe(),
            "dispatcher started"
        );
        for id in 0..self.slots.len() {
            self.schedule_connect(id, Duration::ZERO);
        }

        let mut drain_deadline: Option<Instant> = None;
        loop {
            self.recycle_broken_idle();
            self.dispatch_pending();
            if self.all_slots_exhausted() {
                self.fail_pending("all connection slots failed");
            }
            self.shared.publish(&self.slots);

            if let Some(deadline) = drain_deadline {
                if self.executing.is_empty() && self.shared.pending_len() == 0 {
                    break;
                }
                if Instant::now() >= deadline {
                    self.abort_remaining().await;
                    break;
                }
            }

            let wait = match drain_deadline {
                Some(deadline) => self
                    .options
                    .poll_interval
                    .min(deadline.saturating_duration_since(Instant::now())),
                None => self.options.poll_interval,
            };

            tokio::select! {
                Some((id, conn, outcome)) = self.executing.next(), if !self.executing.is_empty() => {
                    self.on_executed(id, conn, outcome);
                }
                Some((id, result)) = self.connecting.next(), if !self.connecting.is_empty() => {
                    self.on_connected(id, result);
                }
                () = self.shared.wakeup.notified() => {}
                () = self.stop.cancelled(), if drain_deadline.is_none() => {
                    info!(
                        queued = self.shared.pending_len(),
                        in_flight = self.executing.len(),
                        "dispatcher draining"
                    );
                    drain_deadline = Some(Instant::now() + self.options.drain_timeout);
                }
                () = tokio::time::sleep(wait) => {}
            }
        }

        self.connecting = FuturesUnordered::new();
        for slot in &mut self.slots {
            if let Some(query) = slot.disconnect() {
                Self::deliver(query, Completion::connection_error("pool terminated"));
            }
        }
        self.fail_pending("pool terminated");
        self.shared.publish(&self.slots);
        info!("dispatcher stopped");
    }

    fn schedule_connect(&mut self, id: usize, delay: Duration) {
        self.slots[id].begin_connect();
        let connector = Arc::clone(&self.connector);
        self.connecting.push(Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (id, connector.connect().await)
        }));
    }

    fn on_connected(&mut self, id: usize, result: Result<Box<dyn BackendConnection>, SqlDispatchError>) {
        match result {
            Ok(conn) => {
                self.slots[id].connected(conn);
                debug!(slot = id, "slot connected");
            }
            Err(error) => {
                self.slots[id].connect_failed();
                let failures = self.slots[id].failures();
                if self.options.reconnect.allows_retry(failures) {
                    let backoff = self.options.reconnect.backoff(failures);
                    warn!(
                        slot = id,
                        attempt = failures,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "slot connection failed; retrying"
                    );
                    self.schedule_connect(id, backoff);
                } else {
                    self.slots[id].give_up();
                    warn!(slot = id, attempt = failures, error = %error, "slot connection failed; giving up");
                }
            }
        }
    }

    fn recycle_broken_idle(&mut self) {
        for id in 0..self.slots.len() {
            if self.slots[id].idle_broken() {
                warn!(slot = id, "idle connection broken; reconnecting");
                self.slots[id].break_connection();
                let backoff = self.options.reconnect.initial_backoff;
                self.schedule_connect(id, backoff);
            }
        }
    }

    /// Pair idle slots with pending queries in submission order.
    fn dispatch_pending(&mut self) {
        for id in 0..self.slots.len() {
            if self.slots[id].state() != SlotState::Idle {
                continue;
            }
            let Some(query) = self.shared.pop() else {
                break;
            };
            query.sink().mark_executing();
            let (statement, params) = query.work();
            match self.slots[id].dispatch(query) {
                Ok(mut conn) => {
                    debug!(slot = id, "query dispatched");
                    self.executing.push(Box::pin(async move {
                        let outcome = conn.execute(&statement, &params).await;
                        (id, conn, outcome)
                    }));
                }
                Err(query) => {
                    Self::deliver(query, Completion::connection_error("slot unavailable"));
                }
            }
        }
    }

    fn on_executed(
        &mut self,
        id: usize,
        conn: Box<dyn BackendConnection>,
        outcome: Result<BackendResponse, BackendFailure>,
    ) {
        let lost = matches!(outcome, Err(BackendFailure::Connection { .. })) || conn.is_broken();
        if let Err(failure) = &outcome {
            debug!(slot = id, failure = ?failure, "query failed");
        } else {
            debug!(slot = id, "query completed");
        }
        let completion = completion_from(outcome);

        let query = if lost {
            drop(conn);
            let query = self.slots[id].break_connection();
            warn!(slot = id, "connection lost; reconnecting");
            let backoff = self.options.reconnect.initial_backoff;
            self.schedule_connect(id, backoff);
            query
        } else {
            self.slots[id].release(conn)
        };

        if let Some(query) = query {
            Self::deliver(query, completion);
        }
    }

    fn all_slots_exhausted(&self) -> bool {
        self.slots.iter().all(Slot::is_exhausted)
    }

    fn fail_pending(&self, reason: &str) {
        let pending = self.shared.take_all();
        if !pending.is_empty() {
            warn!(queued = pending.len(), reason, "resolving queued queries without execution");
        }
        for query in pending {
            Self::deliver(query, Completion::connection_error(reason));
        }
    }

    /// Drain deadline passed: interrupt executions, give them `ABORT_GRACE` to wind
    /// down, and resolve everything left.
    ///
    /// An execution that settles within the grace reports what actually happened:
    /// success if it finished before the interrupt, otherwise "pool terminated".
    async fn abort_remaining(&mut self) {
        let interrupted = self.slots.iter().filter(|slot| slot.interrupt()).count();
        warn!(
            in_flight = self.executing.len(),
            interrupted,
            queued = self.shared.pending_len(),
            "drain timeout elapsed; aborting remaining queries"
        );

        let settle = async {
            while let Some((id, conn, outcome)) = self.executing.next().await {
                drop(conn);
                let completion = match outcome {
                    Ok(response) => completion_from(Ok(response)),
                    Err(_) => Completion::connection_error("pool terminated"),
                };
                if let Some(query) = self.slots[id].disconnect() {
                    Self::deliver(query, completion);
                }
            }
        };
        if tokio::time::timeout(ABORT_GRACE, settle).await.is_err() {
            warn!(
                in_flight = self.executing.len(),
                "executions still running after interrupt; abandoning them"
            );
        }

        self.executing = FuturesUnordered::new();
        for id in 0..self.slots.len() {
            if let Some(query) = self.slots[id].disconnect() {
                Self::deliver(query, Completion::connection_error("pool terminated"));
            }
        }
        self.fail_pending("pool terminated");
    }

    /// Populate the sink, then fire the hook. A panicking hook is contained so the
    /// loop keeps serving the other slots.
    fn deliver(query: Query, completion: Completion) {
        let Some(hook) = query.finish(completion) else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
            warn!("completion hook panicked");
        }
    }
}
