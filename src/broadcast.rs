//! Fan-out primitives.
//!
//! Delivery is best-effort: a closed target is skipped silently, and a target
//! whose outbound queue is full drops the frame with a warning. Callers never
//! special-case a torn-down peer.

use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::frame::Frame;
use crate::registry::ConnectionRegistry;

/// Deliver one frame to one connection. Returns whether it was queued.
pub fn send(conn: &ConnectionHandle, frame: Frame) -> bool {
    if !conn.is_open() {
        return false;
    }
    match conn.enqueue(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            warn!(conn_id = %conn.id, kind = %frame.kind, "broadcast: outbound queue full, frame dropped");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Deliver a frame to every target except `exclude`. Returns the number queued.
pub fn broadcast(targets: &[ConnectionHandle], frame: &Frame, exclude: Option<Uuid>) -> usize {
    targets
        .iter()
        .filter(|conn| exclude != Some(conn.id))
        .filter(|conn| send(conn, frame.clone()))
        .count()
}

/// Broadcast to a snapshot of a room's current members.
pub fn broadcast_room(registry: &ConnectionRegistry, room_id: Uuid, frame: &Frame, exclude: Option<Uuid>) -> usize {
    let targets = registry.room_connections(room_id);
    broadcast(&targets, frame, exclude)
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
