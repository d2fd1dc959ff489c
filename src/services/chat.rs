//! Chat service — send, typing indicators, delete.
//!
//! DESIGN
//! ======
//! Messages are persisted before they are broadcast, so every `CHAT_NEW` a
//! peer sees has a durable id. Delete comes in two flavours: for everyone
//! (sender only, tombstone broadcast to the room) and for oneself (a
//! per-viewer hide acknowledged only to the caller).

use serde_json::json;
use tracing::info;

use super::{EventContext, Outcome};
use crate::event::{ChatDelete, ChatSend, ChatTyping, EventError};
use crate::frame::{Frame, kinds};
use crate::store::{ChatMessage, NewMessage};

const MESSAGE_NOT_FOUND: &str = "Message not found";

fn message_to_json(message: &ChatMessage) -> serde_json::Value {
    json!({
        "id": message.id,
        "roomId": message.room_id,
        "senderId": message.sender_id,
        "text": message.text,
        "createdAt": message.created_at,
        "isDeleted": message.is_deleted,
    })
}

/// `CHAT_SEND`: persist, then broadcast to the whole room including the sender.
///
/// # Errors
///
/// Gate failures, or `Store` if the insert fails.
pub async fn send(ctx: &EventContext<'_>, req: ChatSend) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let message = ctx
        .state
        .store
        .create_message(NewMessage { room_id: req.room_id, sender_id: ctx.user_id(), text: req.text })
        .await?;

    info!(user_id = %ctx.user_id(), room_id = %req.room_id, message_id = %message.id, "chat: message sent");

    let frame = Frame::new(kinds::CHAT_NEW, json!({ "roomId": req.room_id, "message": message_to_json(&message) }));
    Ok(Outcome::Broadcast { room_id: req.room_id, frame })
}

/// `CHAT_TYPING`: relay the indicator to everyone else.
///
/// # Errors
///
/// Gate failures.
pub async fn typing(ctx: &EventContext<'_>, req: ChatTyping) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;
    let frame = Frame::new(
        kinds::CHAT_TYPING,
        json!({ "roomId": req.room_id, "userId": ctx.user_id(), "isTyping": req.is_typing }),
    );
    Ok(Outcome::BroadcastOthers { room_id: req.room_id, frame })
}

/// `CHAT_DELETE`.
///
/// # Errors
///
/// Gate failures, `NotFound` if the message is not in this room (or is
/// already deleted for everyone), `AccessDenied` if a non-sender deletes for
/// everyone.
pub async fn delete(ctx: &EventContext<'_>, req: ChatDelete) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let store = &ctx.state.store;
    let Some(message) = store.find_message(req.room_id, req.message_id).await? else {
        return Err(EventError::not_found(MESSAGE_NOT_FOUND));
    };

    let payload = json!({ "roomId": req.room_id, "messageId": req.message_id, "forEveryone": req.for_everyone });

    if req.for_everyone {
        if message.sender_id != ctx.user_id() {
            return Err(EventError::access_denied("Only sender can delete for everyone"));
        }
        if message.is_deleted {
            return Err(EventError::not_found(MESSAGE_NOT_FOUND));
        }
        store
            .tombstone_message(req.room_id, req.message_id)
            .await?
            .ok_or_else(|| EventError::not_found(MESSAGE_NOT_FOUND))?;
        info!(user_id = %ctx.user_id(), room_id = %req.room_id, message_id = %req.message_id, "chat: message deleted");
        return Ok(Outcome::Broadcast { room_id: req.room_id, frame: Frame::new(kinds::CHAT_DELETED, payload) });
    }

    store
        .hide_message(req.room_id, req.message_id, ctx.user_id())
        .await?
        .ok_or_else(|| EventError::not_found(MESSAGE_NOT_FOUND))?;
    Ok(Outcome::Reply(Frame::new(kinds::CHAT_DELETED, payload)))
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
