//! In-memory [`Store`] for tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{
    BoardElement, ChatMessage, Membership, NewElement, NewMessage, Role, Room, Store, StoreError, merge_shallow,
};
use crate::frame::{Payload, now_ms};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    rooms: HashMap<Uuid, Room>,
    members: HashMap<(Uuid, Uuid), Option<Role>>,
    messages: HashMap<Uuid, ChatMessage>,
    elements: HashMap<(Uuid, String), BoardElement>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a room owned by `owner_id` and return its id.
    pub fn seed_room(&self, owner_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().rooms.insert(id, Room { id, name: "Test Room".into(), owner_id });
        id
    }

    pub fn add_member(&self, room_id: Uuid, user_id: Uuid, role: Option<Role>) {
        self.lock().members.insert((room_id, user_id), role);
    }

    pub fn remove_member(&self, room_id: Uuid, user_id: Uuid) {
        self.lock().members.remove(&(room_id, user_id));
    }

    pub fn delete_room(&self, room_id: Uuid) {
        self.lock().rooms.remove(&room_id);
    }

    pub fn element(&self, room_id: Uuid, element_id: &str) -> Option<BoardElement> {
        self.lock().elements.get(&(room_id, element_id.to_string())).cloned()
    }

    pub fn message(&self, message_id: Uuid) -> Option<ChatMessage> {
        self.lock().messages.get(&message_id).cloned()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn find_room(&self, room_id: Uuid) -> Result<Option<Room>, StoreError> {
        Ok(self.lock().rooms.get(&room_id).cloned())
    }

    async fn find_membership(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .lock()
            .members
            .get(&(room_id, user_id))
            .map(|role| Membership { room_id, user_id, role: *role }))
    }

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let now = now_ms();
        let record = ChatMessage {
            id: Uuid::new_v4(),
            room_id: message.room_id,
            sender_id: message.sender_id,
            text: message.text,
            is_deleted: false,
            deleted_for: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.lock().messages.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_message(&self, room_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .lock()
            .messages
            .get(&message_id)
            .filter(|m| m.room_id == room_id)
            .cloned())
    }

    async fn tombstone_message(&self, room_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let mut tables = self.lock();
        let Some(message) = tables
            .messages
            .get_mut(&message_id)
            .filter(|m| m.room_id == room_id && !m.is_deleted)
        else {
            return Ok(None);
        };
        message.is_deleted = true;
        message.text.clear();
        message.updated_at = now_ms();
        Ok(Some(message.clone()))
    }

    async fn hide_message(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let mut tables = self.lock();
        let Some(message) = tables.messages.get_mut(&message_id).filter(|m| m.room_id == room_id) else {
            return Ok(None);
        };
        if !message.deleted_for.contains(&user_id) {
            message.deleted_for.push(user_id);
            message.updated_at = now_ms();
        }
        Ok(Some(message.clone()))
    }

    async fn create_element(&self, element: NewElement) -> Result<BoardElement, StoreError> {
        let mut tables = self.lock();
        let key = (element.room_id, element.element_id.clone());
        if tables.elements.contains_key(&key) {
            return Err(StoreError::Conflict(element.element_id));
        }
        let now = now_ms();
        let record = BoardElement {
            room_id: element.room_id,
            element_id: element.element_id,
            user_id: element.user_id,
            kind: element.kind,
            data: element.data,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        tables.elements.insert(key, record.clone());
        Ok(record)
    }

    async fn find_element(&self, room_id: Uuid, element_id: &str) -> Result<Option<BoardElement>, StoreError> {
        Ok(self.element(room_id, element_id))
    }

    async fn patch_element(
        &self,
        room_id: Uuid,
        element_id: &str,
        patch: &Payload,
    ) -> Result<Option<BoardElement>, StoreError> {
        let mut tables = self.lock();
        let Some(element) = tables
            .elements
            .get_mut(&(room_id, element_id.to_string()))
            .filter(|e| !e.is_deleted)
        else {
            return Ok(None);
        };
        merge_shallow(&mut element.data, patch);
        element.updated_at = now_ms();
        Ok(Some(element.clone()))
    }

    async fn tombstone_element(&self, room_id: Uuid, element_id: &str) -> Result<Option<BoardElement>, StoreError> {
        let mut tables = self.lock();
        let Some(element) = tables
            .elements
            .get_mut(&(room_id, element_id.to_string()))
            .filter(|e| !e.is_deleted)
        else {
            return Ok(None);
        };
        element.is_deleted = true;
        element.updated_at = now_ms();
        Ok(Some(element.clone()))
    }

    async fn restore_element(
        &self,
        room_id: Uuid,
        element_id: &str,
        data: Option<&Payload>,
    ) -> Result<Option<BoardElement>, StoreError> {
        let mut tables = self.lock();
        let Some(element) = tables.elements.get_mut(&(room_id, element_id.to_string())) else {
            return Ok(None);
        };
        element.is_deleted = false;
        if let Some(data) = data {
            merge_shallow(&mut element.data, data);
        }
        element.updated_at = now_ms();
        Ok(Some(element.clone()))
    }
}
