//! Authorization gate — may this user act in this room?
//!
//! DESIGN
//! ======
//! Resolution order is fixed: id shape, room existence, ownership, then
//! membership. The owner always resolves to `Role::Owner` even without a
//! membership row, and a membership row without a stored role is a viewer.
//!
//! Nothing is cached. Every room-scoped event consults the store afresh, so
//! a revoked membership takes effect on the next event.

use uuid::Uuid;

use crate::frame::{ErrorCode, SERVER_ERROR_MESSAGE, codes};
use crate::store::{Role, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Invalid room")]
    InvalidId,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Not a member")]
    NotMember,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ErrorCode for AccessError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidId | Self::RoomNotFound | Self::NotMember => codes::ACCESS_DENIED,
            Self::Store(_) => codes::SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Store(_) => SERVER_ERROR_MESSAGE.into(),
            other => other.to_string(),
        }
    }
}

/// A granted room access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub room_id: Uuid,
    pub role: Role,
}

/// Gate for a raw, client-supplied room id.
///
/// # Errors
///
/// `InvalidId` if `room_id` is not a UUID, otherwise as [`ensure_member_id`].
pub async fn ensure_member(store: &dyn Store, room_id: &str, user_id: Uuid) -> Result<Access, AccessError> {
    let room_id: Uuid = room_id.trim().parse().map_err(|_| AccessError::InvalidId)?;
    let role = ensure_member_id(store, room_id, user_id).await?;
    Ok(Access { room_id, role })
}

/// Gate for an already-validated room id.
///
/// # Errors
///
/// `RoomNotFound`, `NotMember`, or `Store` when the lookup itself fails.
pub async fn ensure_member_id(store: &dyn Store, room_id: Uuid, user_id: Uuid) -> Result<Role, AccessError> {
    let Some(room) = store.find_room(room_id).await? else {
        return Err(AccessError::RoomNotFound);
    };
    if room.owner_id == user_id {
        return Ok(Role::Owner);
    }
    let Some(membership) = store.find_membership(room_id, user_id).await? else {
        return Err(AccessError::NotMember);
    };
    Ok(membership.role.unwrap_or(Role::Viewer))
}

#[cfg(test)]
#[path = "access_test.rs"]
mod tests;
