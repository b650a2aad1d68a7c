use crate::backend::{BackendConnection, Interrupter};
use crate::query::Query;

/// Lifecycle of one backend connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Disconnected,
    Connecting,
    Idle,
    Busy,
    Failed,
}

impl SlotState {
    /// Whether the slot holds an established connection.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, SlotState::Idle | SlotState::Busy)
    }
}

/// A slot is owned by the dispatcher. While `Busy` its connection lives inside the
/// executing future, and the query it serves is parked here.
pub(crate) struct Slot {
    state: SlotState,
    conn: Option<Box<dyn BackendConnection>>,
    in_flight: Option<Query>,
    interrupter: Option<Interrupter>,
    failures: u32,
    exhausted: bool,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            state: SlotState::Disconnected,
            conn: None,
            in_flight: None,
            interrupter: None,
            failures: 0,
            exhausted: false,
        }
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
    }

    /// Consecutive failed connection attempts since the last success.
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    /// Failed and out of reconnect attempts.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn begin_connect(&mut self) {
        self.state = SlotState::Connecting;
    }

    pub(crate) fn connected(&mut self, conn: Box<dyn BackendConnection>) {
        self.conn = Some(conn);
        self.state = SlotState::Idle;
        self.failures = 0;
    }

    pub(crate) fn connect_failed(&mut self) {
        self.state = SlotState::Failed;
        self.failures = self.failures.saturating_add(1);
    }

    pub(crate) fn give_up(&mut self) {
        self.exhausted = true;
    }

    /// Idle connection reports itself broken; drop it.
    pub(crate) fn idle_broken(&self) -> bool {
        self.state == SlotState::Idle && self.conn.as_ref().is_some_and(|c| c.is_broken())
    }

    /// Hand the connection out for `query`. Only valid while `Idle`.
    pub(crate) fn dispatch(&mut self, query: Query) -> Result<Box<dyn BackendConnection>, Query> {
        if self.state != SlotState::Idle {
            return Err(query);
        }
        match self.conn.take() {
            Some(conn) => {
                self.state = SlotState::Busy;
                self.in_flight = Some(query);
                self.interrupter = conn.interrupter();
                Ok(conn)
            }
            None => Err(query),
        }
    }

    /// Abort the statement this slot is running, if any.
    pub(crate) fn interrupt(&self) -> bool {
        match (&self.state, &self.interrupter) {
            (SlotState::Busy, Some(interrupt)) => {
                interrupt();
                true
            }
            _ => false,
        }
    }

    /// The execution finished on a healthy connection.
    pub(crate) fn release(&mut self, conn: Box<dyn BackendConnection>) -> Option<Query> {
        self.interrupter = None;
        self.conn = Some(conn);
        self.state = SlotState::Idle;
        self.in_flight.take()
    }

    /// The connection is gone. Returns the query it was serving, if any.
    pub(crate) fn break_connection(&mut self) -> Option<Query> {
        self.interrupter = None;
        self.conn = None;
        self.state = SlotState::Failed;
        self.in_flight.take()
    }

    /// Final teardown at shutdown.
    pub(crate) fn disconnect(&mut self) -> Option<Query> {
        self.interrupter = None;
        self.conn = None;
        self.state = SlotState::Disconnected;
        self.in_flight.take()
    }
}
