//! Connection handle — the shareable side of one live WebSocket session.
//!
//! DESIGN
//! ======
//! The socket itself is owned by its connection task. Everything else talks
//! to it through a cloneable handle: frames go onto a bounded outbound queue
//! and liveness commands onto a small control queue, both drained by the
//! task's `select!` loop.
//!
//! Closing is a watch flag rather than a queued command. The connection task
//! races its whole session against [`ConnectionHandle::closed`], so an
//! eviction ends the task even while it is blocked writing to a peer that
//! stopped reading.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::frame::Frame;
use crate::services::auth::Identity;

const CONTROL_QUEUE_CAPACITY: usize = 4;

/// Commands from the liveness monitor to a connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Send a WebSocket ping.
    Ping,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub identity: Identity,
    outbound: mpsc::Sender<Frame>,
    control: mpsc::Sender<Control>,
    alive: Arc<AtomicBool>,
    closed: Arc<watch::Sender<bool>>,
}

/// Receiving ends owned by the connection task.
pub struct ConnectionChannels {
    pub outbound: mpsc::Receiver<Frame>,
    pub control: mpsc::Receiver<Control>,
}

impl ConnectionHandle {
    /// Create a handle for a freshly authenticated connection. Starts open
    /// and responsive.
    #[must_use]
    pub fn new(identity: Identity, outbound_capacity: usize) -> (Self, ConnectionChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let handle = Self {
            id: Uuid::new_v4(),
            identity,
            outbound: outbound_tx,
            control: control_tx,
            alive: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(watch::Sender::new(false)),
        };
        (handle, ConnectionChannels { outbound: outbound_rx, control: control_rx })
    }

    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }

    /// Whether frames can still be delivered.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !*self.closed.borrow() && !self.outbound.is_closed()
    }

    /// Mark closed and wake [`Self::closed`] waiters. Returns `true` only for
    /// the call that performed the transition.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Resolves once [`Self::close`] has been called, immediately if it
    /// already was.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Record a pong (or any other sign of life).
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Read and clear the liveness flag.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn enqueue(&self, frame: Frame) -> Result<(), TrySendError<Frame>> {
        self.outbound.try_send(frame)
    }

    /// Best-effort control signal. A task that has already exited needs none.
    pub fn signal(&self, control: Control) {
        let _ = self.control.try_send(control);
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
