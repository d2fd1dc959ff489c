//! Room service — join, leave, and departure announcements.
//!
//! DESIGN
//! ======
//! Joining is the only way into a room's broadcast set, and the only
//! room-scoped event that skips the joined check. Leaving needs no gate: a
//! connection may always remove itself, even from a room it has since lost
//! access to.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{EventContext, Outcome, access};
use crate::broadcast::broadcast_room;
use crate::event::{EventError, RoomRef};
use crate::frame::{Frame, kinds};
use crate::registry::ConnectionRegistry;
use crate::services::auth::Identity;

/// `ROOM_JOIN`: gate, register, reply with the online roster, announce.
///
/// # Errors
///
/// `AccessDenied` if the gate refuses.
pub async fn join(ctx: &EventContext<'_>, req: RoomRef) -> Result<Outcome, EventError> {
    let access = access::ensure_member(ctx.state.store.as_ref(), &req.room_id, ctx.user_id()).await?;
    let room_id = access.room_id;

    if !ctx.state.registry.join(ctx.conn.id, room_id) {
        // Evicted while the gate was in flight; nobody is listening.
        return Err(EventError::access_denied("Connection closed"));
    }

    let online_users = ctx.state.registry.online_users(room_id);
    info!(conn_id = %ctx.conn.id, user_id = %ctx.user_id(), %room_id, role = access.role.as_str(), online = online_users.len(), "room: joined");

    let reply = Frame::new(kinds::ROOM_JOINED, json!({ "roomId": room_id, "onlineUsers": online_users }));
    let broadcast = Frame::new(
        kinds::PRESENCE_JOIN,
        json!({ "roomId": room_id, "userId": ctx.user_id(), "name": ctx.conn.identity.name }),
    );
    Ok(Outcome::ReplyAndBroadcast { reply, room_id, broadcast })
}

/// `ROOM_LEAVE`: always succeeds. Peers hear about it only if a membership
/// was actually removed.
pub fn leave(ctx: &EventContext<'_>, req: RoomRef) -> Outcome {
    let Ok(room_id) = req.room_id.trim().parse::<Uuid>() else {
        // Never joinable, so never joined.
        return Outcome::Reply(Frame::new(kinds::ROOM_LEFT, json!({ "roomId": req.room_id.trim() })));
    };
    let reply = Frame::new(kinds::ROOM_LEFT, json!({ "roomId": room_id }));

    if !ctx.state.registry.leave(ctx.conn.id, room_id) {
        return Outcome::Reply(reply);
    }

    info!(conn_id = %ctx.conn.id, user_id = %ctx.user_id(), %room_id, "room: left");
    Outcome::ReplyAndBroadcast { reply, room_id, broadcast: presence_leave(room_id, ctx.user_id()) }
}

/// Tell each room a connection was removed from that its user left.
/// Rooms with nobody left to tell are skipped by the broadcast itself.
pub fn announce_departure(registry: &ConnectionRegistry, identity: &Identity, rooms: &[Uuid]) {
    for room_id in rooms {
        broadcast_room(registry, *room_id, &presence_leave(*room_id, identity.user_id), None);
    }
}

fn presence_leave(room_id: Uuid, user_id: Uuid) -> Frame {
    Frame::new(kinds::PRESENCE_LEAVE, json!({ "roomId": room_id, "userId": user_id }))
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
