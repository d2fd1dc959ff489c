//! Board service — element lifecycle and live drag previews.
//!
//! DESIGN
//! ======
//! Elements are keyed by a client-chosen `elementId`, unique per room.
//! Only the creator may delete or restore; any member may update. Deletes
//! are tombstones, so a restore brings back the element with its data.
//!
//! `BOARD_ELEMENT_LIVE` carries in-progress state (a shape mid-drag) and is
//! relayed without touching the store.
//!
//! TRADE-OFFS
//! ==========
//! Concurrent updates to one element are last-write-wins. Updates are
//! conditional on the element still being live when the write lands, so a
//! delete racing an update surfaces as `NOT_FOUND` rather than a patch
//! applied to a tombstone.

use serde_json::{Value, json};
use tracing::{debug, info};

use super::{EventContext, Outcome};
use crate::event::{ElementAdd, ElementLive, ElementRef, ElementRestore, ElementUpdate, EventError};
use crate::frame::{Frame, kinds};
use crate::store::{BoardElement, NewElement, StoreError};

const ELEMENT_NOT_FOUND: &str = "Element not found";
const ELEMENT_DELETED: &str = "Element is deleted";

/// Wire shape of a persisted element.
#[must_use]
pub fn element_to_json(element: &BoardElement) -> Value {
    json!({
        "elementId": element.element_id,
        "type": element.kind,
        "data": element.data,
        "userId": element.user_id,
        "isDeleted": element.is_deleted,
        "createdAt": element.created_at,
        "updatedAt": element.updated_at,
    })
}

// =============================================================================
// PERSISTED EDITS
// =============================================================================

/// `BOARD_ELEMENT_ADD`.
///
/// # Errors
///
/// Gate failures, or `BadRequest` if the id is taken in this room.
pub async fn add(ctx: &EventContext<'_>, req: ElementAdd) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let created = ctx
        .state
        .store
        .create_element(NewElement {
            room_id: req.room_id,
            element_id: req.element_id,
            user_id: ctx.user_id(),
            kind: req.kind,
            data: req.data,
        })
        .await;
    let element = match created {
        Ok(element) => element,
        Err(StoreError::Conflict(_)) => return Err(EventError::bad_request("Element already exists")),
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %ctx.user_id(), room_id = %req.room_id, element_id = %element.element_id, kind = %element.kind, "board: element added");

    let frame = Frame::new(kinds::BOARD_ELEMENT_ADDED, json!({ "roomId": req.room_id, "element": element_to_json(&element) }));
    Ok(Outcome::Broadcast { room_id: req.room_id, frame })
}

/// `BOARD_ELEMENT_UPDATE`: shallow-merge `patch` into the element's data.
///
/// # Errors
///
/// Gate failures, or `NotFound` if the element is absent or tombstoned.
pub async fn update(ctx: &EventContext<'_>, req: ElementUpdate) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let store = &ctx.state.store;
    let Some(element) = store.find_element(req.room_id, &req.element_id).await? else {
        return Err(EventError::not_found(ELEMENT_NOT_FOUND));
    };
    if element.is_deleted {
        return Err(EventError::not_found(ELEMENT_DELETED));
    }

    store
        .patch_element(req.room_id, &req.element_id, &req.patch)
        .await?
        .ok_or_else(|| EventError::not_found(ELEMENT_NOT_FOUND))?;

    debug!(user_id = %ctx.user_id(), room_id = %req.room_id, element_id = %req.element_id, "board: element updated");

    let frame = Frame::new(
        kinds::BOARD_ELEMENT_UPDATED,
        json!({ "roomId": req.room_id, "elementId": req.element_id, "patch": req.patch }),
    );
    Ok(Outcome::Broadcast { room_id: req.room_id, frame })
}

/// `BOARD_ELEMENT_DELETE`: tombstone. Creator only; the ownership check
/// happens before any write.
///
/// # Errors
///
/// Gate failures, `NotFound` if absent or already deleted, or
/// `AccessDenied` for a non-creator.
pub async fn delete(ctx: &EventContext<'_>, req: ElementRef) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let store = &ctx.state.store;
    let Some(element) = store.find_element(req.room_id, &req.element_id).await? else {
        return Err(EventError::not_found(ELEMENT_NOT_FOUND));
    };
    if element.user_id != ctx.user_id() {
        return Err(EventError::access_denied("Cannot delete this element"));
    }
    if element.is_deleted {
        return Err(EventError::not_found(ELEMENT_DELETED));
    }

    store
        .tombstone_element(req.room_id, &req.element_id)
        .await?
        .ok_or_else(|| EventError::not_found(ELEMENT_NOT_FOUND))?;

    info!(user_id = %ctx.user_id(), room_id = %req.room_id, element_id = %req.element_id, "board: element deleted");

    let frame = Frame::new(kinds::BOARD_ELEMENT_DELETED, json!({ "roomId": req.room_id, "elementId": req.element_id }));
    Ok(Outcome::Broadcast { room_id: req.room_id, frame })
}

/// `BOARD_ELEMENT_RESTORE`: clear the tombstone, optionally merging data.
///
/// # Errors
///
/// Gate failures, `NotFound`, or `AccessDenied` for a non-creator.
pub async fn restore(ctx: &EventContext<'_>, req: ElementRestore) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let store = &ctx.state.store;
    let Some(element) = store.find_element(req.room_id, &req.element_id).await? else {
        return Err(EventError::not_found(ELEMENT_NOT_FOUND));
    };
    if element.user_id != ctx.user_id() {
        return Err(EventError::access_denied("Cannot restore this element"));
    }

    let restored = store
        .restore_element(req.room_id, &req.element_id, req.data.as_ref())
        .await?
        .ok_or_else(|| EventError::not_found(ELEMENT_NOT_FOUND))?;

    info!(user_id = %ctx.user_id(), room_id = %req.room_id, element_id = %req.element_id, "board: element restored");

    let frame = Frame::new(
        kinds::BOARD_ELEMENT_RESTORED,
        json!({ "roomId": req.room_id, "element": element_to_json(&restored) }),
    );
    Ok(Outcome::Broadcast { room_id: req.room_id, frame })
}

// =============================================================================
// EPHEMERAL
// =============================================================================

/// `BOARD_ELEMENT_LIVE`: relay to peers, stamped with the sender.
///
/// # Errors
///
/// Gate failures.
pub async fn live(ctx: &EventContext<'_>, req: ElementLive) -> Result<Outcome, EventError> {
    ctx.authorize(req.room_id).await?;

    let mut element = req.element;
    element.insert("userId".into(), json!(ctx.user_id()));

    let frame = Frame::new(kinds::BOARD_ELEMENT_LIVE, json!({ "roomId": req.room_id, "element": element }));
    Ok(Outcome::BroadcastOthers { room_id: req.room_id, frame })
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
