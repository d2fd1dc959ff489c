//! Persistent store — rooms, memberships, chat messages, board elements.
//!
//! ARCHITECTURE
//! ============
//! The realtime core only needs keyed create/find/update operations, so the
//! store is a trait. `PgStore` is the production implementation; tests use
//! the in-memory `MemoryStore`.
//!
//! DESIGN
//! ======
//! Records are never physically deleted. Messages and elements carry a
//! tombstone flag, and the mutating operations are conditional so a caller
//! that checked state before suspending re-detects a concurrent change as
//! `None` instead of clobbering it.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::frame::Payload;

pub use postgres::PgStore;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Membership role within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "owner" => Some(Self::Owner),
            "editor" => Some(Self::Editor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
}

/// A membership row. `role` is `None` when the row predates roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub is_deleted: bool,
    /// Users who hid this message for themselves.
    pub deleted_for: Vec<Uuid>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardElement {
    pub room_id: Uuid,
    pub element_id: String,
    /// Creator; the only user allowed to delete or restore.
    pub user_id: Uuid,
    pub kind: String,
    pub data: Payload,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NewElement {
    pub room_id: Uuid,
    pub element_id: String,
    pub user_id: Uuid,
    pub kind: String,
    pub data: Payload,
}

/// Shallow merge: top-level keys in `patch` replace those in `data`.
/// Postgres does the same with JSONB `||`.
#[cfg(test)]
pub fn merge_shallow(data: &mut Payload, patch: &Payload) {
    for (key, value) in patch {
        data.insert(key.clone(), value.clone());
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>, StoreError>;

    async fn find_membership(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, StoreError>;

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    async fn find_message(&self, room_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError>;

    /// Delete for everyone: clear the text and set the tombstone. `None` if
    /// absent or already tombstoned.
    async fn tombstone_message(&self, room_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError>;

    /// Hide for one viewer. Adding the same viewer twice is a no-op.
    async fn hide_message(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatMessage>, StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the element id already exists in the room.
    async fn create_element(&self, element: NewElement) -> Result<BoardElement, StoreError>;

    async fn find_element(&self, room_id: Uuid, element_id: &str) -> Result<Option<BoardElement>, StoreError>;

    /// Merge `patch` into a live element's data. `None` if absent or tombstoned.
    async fn patch_element(
        &self,
        room_id: Uuid,
        element_id: &str,
        patch: &Payload,
    ) -> Result<Option<BoardElement>, StoreError>;

    /// `None` if absent or already tombstoned.
    async fn tombstone_element(&self, room_id: Uuid, element_id: &str) -> Result<Option<BoardElement>, StoreError>;

    /// Clear the tombstone and optionally merge replacement data.
    async fn restore_element(
        &self,
        room_id: Uuid,
        element_id: &str,
        data: Option<&Payload>,
    ) -> Result<Option<BoardElement>, StoreError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
