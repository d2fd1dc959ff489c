//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! Handler functions are pure business logic: they validate, authorize,
//! mutate the store and registry, and return an [`Outcome`]. The dispatch
//! layer in `routes::ws` owns all outbound concerns, replying to the sender
//! and broadcasting to room peers.
//!
//! Every room-scoped handler (everything except join and leave) runs the
//! same gate before touching state: [`EventContext::authorize`] checks store
//! membership first, then registry membership.

pub mod access;
pub mod auth;
pub mod board;
pub mod chat;
pub mod liveness;
pub mod presence;
pub mod room;

use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::event::EventError;
use crate::frame::Frame;
use crate::state::AppState;
use crate::store::Role;

// =============================================================================
// OUTCOME
// =============================================================================

/// What a handler wants delivered. Handlers never send frames directly.
#[derive(Debug)]
pub enum Outcome {
    /// Send to the originator only. Carries the request id.
    Reply(Frame),
    /// Broadcast to every connection joined to the room, originator included.
    Broadcast { room_id: Uuid, frame: Frame },
    /// Broadcast to the room excluding the originator.
    BroadcastOthers { room_id: Uuid, frame: Frame },
    /// Reply to the originator, and broadcast a different frame to its peers.
    ReplyAndBroadcast { reply: Frame, room_id: Uuid, broadcast: Frame },
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a handler may touch for one inbound event.
pub struct EventContext<'a> {
    pub state: &'a AppState,
    pub conn: &'a ConnectionHandle,
}

impl<'a> EventContext<'a> {
    #[must_use]
    pub fn new(state: &'a AppState, conn: &'a ConnectionHandle) -> Self {
        Self { state, conn }
    }

    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.conn.user_id()
    }

    /// Room gate plus joined check, in that order.
    ///
    /// # Errors
    ///
    /// `AccessDenied` with the gate's reason, `NotJoined` if the connection
    /// never joined the room, or `Store` if the lookup failed.
    pub async fn authorize(&self, room_id: Uuid) -> Result<Role, EventError> {
        let role = access::ensure_member_id(self.state.store.as_ref(), room_id, self.user_id()).await?;
        if !self.state.registry.is_joined(self.conn.id, room_id) {
            return Err(EventError::NotJoined);
        }
        Ok(role)
    }
}
