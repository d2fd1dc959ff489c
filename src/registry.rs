//! Connection registry — who is connected, and who receives which room.
//!
//! DESIGN
//! ======
//! Three maps behind one mutex:
//! - `connections`: every live, authenticated connection (swept by the
//!   liveness monitor).
//! - `room_members`: room → connections, in join order.
//! - `joined_rooms`: connection → rooms, in join order.
//!
//! The last two are mirror images. Every mutation touches both under the same
//! guard, and empty entries are removed in the same critical section, so no
//! reader ever observes an asymmetric or empty entry. The lock is a
//! `std::sync::Mutex` and is never held across an `.await`.
//!
//! Membership here means "receives broadcasts". Being an authorized member of
//! a room in the store is not enough: a connection enters `room_members` only
//! through an explicit, successful join.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::services::auth::Identity;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<Uuid, ConnectionHandle>,
    room_members: HashMap<Uuid, Vec<Uuid>>,
    joined_rooms: HashMap<Uuid, Vec<Uuid>>,
}

impl RegistryInner {
    fn remove_pair(&mut self, conn_id: Uuid, room_id: Uuid) -> bool {
        let mut removed = false;
        if let Some(members) = self.room_members.get_mut(&room_id) {
            let before = members.len();
            members.retain(|id| *id != conn_id);
            removed = members.len() != before;
            if members.is_empty() {
                self.room_members.remove(&room_id);
            }
        }
        if let Some(rooms) = self.joined_rooms.get_mut(&conn_id) {
            rooms.retain(|id| *id != room_id);
            if rooms.is_empty() {
                self.joined_rooms.remove(&conn_id);
            }
        }
        removed
    }

    /// Remove a connection from every room it joined. Returns the affected
    /// rooms in join order.
    fn cleanup_all(&mut self, conn_id: Uuid) -> Vec<Uuid> {
        let rooms = self.joined_rooms.remove(&conn_id).unwrap_or_default();
        for room_id in &rooms {
            self.remove_pair(conn_id, *room_id);
        }
        rooms
    }
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// Track a newly authenticated connection.
    pub fn register(&self, conn: ConnectionHandle) {
        self.lock().connections.insert(conn.id, conn);
    }

    /// Forget a connection entirely. Returns the rooms it was still in so
    /// callers can announce the departure.
    ///
    /// Both steps run under one guard: a join racing the close sees the
    /// connection gone and is refused.
    pub fn unregister(&self, conn_id: Uuid) -> Vec<Uuid> {
        let mut inner = self.lock();
        inner.connections.remove(&conn_id);
        inner.cleanup_all(conn_id)
    }

    /// Snapshot of every live connection.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.lock().connections.values().cloned().collect()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    // =========================================================================
    // ROOMS
    // =========================================================================

    /// Add a connection to a room. Idempotent. Returns `false` if the
    /// connection is no longer registered (closed while the join was in
    /// flight), in which case nothing changes.
    pub fn join(&self, conn_id: Uuid, room_id: Uuid) -> bool {
        let mut inner = self.lock();
        if !inner.connections.contains_key(&conn_id) {
            return false;
        }
        let members = inner.room_members.entry(room_id).or_default();
        if !members.contains(&conn_id) {
            members.push(conn_id);
        }
        let rooms = inner.joined_rooms.entry(conn_id).or_default();
        if !rooms.contains(&room_id) {
            rooms.push(room_id);
        }
        true
    }

    /// Remove a connection from a room. No-op if it was not there.
    /// Returns whether a membership was removed.
    pub fn leave(&self, conn_id: Uuid, room_id: Uuid) -> bool {
        self.lock().remove_pair(conn_id, room_id)
    }

    #[must_use]
    pub fn is_joined(&self, conn_id: Uuid, room_id: Uuid) -> bool {
        self.lock()
            .joined_rooms
            .get(&conn_id)
            .is_some_and(|rooms| rooms.contains(&room_id))
    }

    #[cfg(test)]
    #[must_use]
    pub fn contains_room(&self, room_id: Uuid) -> bool {
        self.lock().room_members.contains_key(&room_id)
    }

    /// Snapshot of the handles currently joined to a room.
    #[must_use]
    pub fn room_connections(&self, room_id: Uuid) -> Vec<ConnectionHandle> {
        let inner = self.lock();
        let Some(members) = inner.room_members.get(&room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| inner.connections.get(id).cloned())
            .collect()
    }

    /// Identities in a room, one entry per user even with several sessions.
    #[must_use]
    pub fn online_users(&self, room_id: Uuid) -> Vec<Identity> {
        let mut users: Vec<Identity> = Vec::new();
        for conn in self.room_connections(room_id) {
            if users.iter().any(|u| u.user_id == conn.identity.user_id) {
                continue;
            }
            users.push(conn.identity);
        }
        users
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
