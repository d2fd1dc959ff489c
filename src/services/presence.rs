//! Presence service — cursor positions.
//!
//! Cursor updates are high-frequency and never persisted. The cursor value
//! is opaque and relayed as sent, `null` when absent.

use serde_json::json;

use super::{EventContext, Outcome};
use crate::event::{EventError, PresenceUpdate};
use crate::frame::{Frame, kinds};

/// `PRESENCE_UPDATE`: broadcast `PRESENCE_STATE` to peers.
///
/// # Errors
///
/// Gate failures.
pub async fn update(ctx: &EventContext<'_>, req: PresenceUpdate) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;
    let frame = Frame::new(
        kinds::PRESENCE_STATE,
        json!({ "roomId": req.room_id, "userId": ctx.user_id(), "cursor": req.cursor }),
    );
    Ok(Outcome::BroadcastOthers { room_id: req.room_id, frame })
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
