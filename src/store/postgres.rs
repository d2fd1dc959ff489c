//! Postgres-backed [`Store`].
//!
//! Timestamps are stored as epoch milliseconds (`BIGINT`). Element data is
//! `JSONB`, so the shallow merge is a single `data || $patch` update.

use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{BoardElement, ChatMessage, Membership, NewElement, NewMessage, Role, Room, Store, StoreError};
use crate::frame::{Payload, into_payload, now_ms};

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, text, is_deleted, deleted_for, created_at, updated_at";
const ELEMENT_COLUMNS: &str = "room_id, element_id, user_id, kind, data, is_deleted, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &PgRow) -> ChatMessage {
    ChatMessage {
        id: row.get("id"),
        room_id: row.get("room_id"),
        sender_id: row.get("sender_id"),
        text: row.get("text"),
        is_deleted: row.get("is_deleted"),
        deleted_for: row.get("deleted_for"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn element_from_row(row: &PgRow) -> BoardElement {
    BoardElement {
        room_id: row.get("room_id"),
        element_id: row.get("element_id"),
        user_id: row.get("user_id"),
        kind: row.get("kind"),
        data: into_payload(row.get::<Value, _>("data")),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>, StoreError> {
        let row = sqlx::query("SELECT id, name, owner_id FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Room { id: r.get("id"), name: r.get("name"), owner_id: r.get("owner_id") }))
    }

    async fn find_membership(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query("SELECT role FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let role: Option<String> = r.get("role");
            Membership { room_id, user_id, role: role.as_deref().and_then(Role::parse) }
        }))
    }

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let now = now_ms();
        let row = sqlx::query(&format!(
            "INSERT INTO messages (id, room_id, sender_id, text, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(&message.text)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(message_from_row(&row))
    }

    async fn find_message(&self, room_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND room_id = $2"))
            .bind(message_id)
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn tombstone_message(&self, room_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE messages SET is_deleted = TRUE, text = '', updated_at = $3
             WHERE id = $1 AND room_id = $2 AND NOT is_deleted
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .bind(room_id)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn hide_message(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE messages
             SET deleted_for = CASE WHEN $3 = ANY(deleted_for) THEN deleted_for ELSE array_append(deleted_for, $3) END,
                 updated_at = CASE WHEN $3 = ANY(deleted_for) THEN updated_at ELSE $4 END
             WHERE id = $1 AND room_id = $2
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message_id)
        .bind(room_id)
        .bind(user_id)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn create_element(&self, element: NewElement) -> Result<BoardElement, StoreError> {
        let now = now_ms();
        let result = sqlx::query(&format!(
            "INSERT INTO board_elements (room_id, element_id, user_id, kind, data, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(element.room_id)
        .bind(&element.element_id)
        .bind(element.user_id)
        .bind(&element.kind)
        .bind(Value::Object(element.data))
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(element_from_row(&row)),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(StoreError::Conflict(element.element_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_element(&self, room_id: Uuid, element_id: &str) -> Result<Option<BoardElement>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM board_elements WHERE room_id = $1 AND element_id = $2"
        ))
        .bind(room_id)
        .bind(element_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(element_from_row))
    }

    async fn patch_element(
        &self,
        room_id: Uuid,
        element_id: &str,
        patch: &Payload,
    ) -> Result<Option<BoardElement>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE board_elements SET data = data || $3, updated_at = $4
             WHERE room_id = $1 AND element_id = $2 AND NOT is_deleted
             RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(room_id)
        .bind(element_id)
        .bind(Value::Object(patch.clone()))
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(element_from_row))
    }

    async fn tombstone_element(&self, room_id: Uuid, element_id: &str) -> Result<Option<BoardElement>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE board_elements SET is_deleted = TRUE, updated_at = $3
             WHERE room_id = $1 AND element_id = $2 AND NOT is_deleted
             RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(room_id)
        .bind(element_id)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(element_from_row))
    }

    async fn restore_element(
        &self,
        room_id: Uuid,
        element_id: &str,
        data: Option<&Payload>,
    ) -> Result<Option<BoardElement>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE board_elements
             SET is_deleted = FALSE, data = data || COALESCE($3, '{{}}'::jsonb), updated_at = $4
             WHERE room_id = $1 AND element_id = $2
             RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(room_id)
        .bind(element_id)
        .bind(data.map(|d| Value::Object(d.clone())))
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(element_from_row))
    }
}
