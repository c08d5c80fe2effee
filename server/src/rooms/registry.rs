use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ws::ConnectionId;

/// Caller-supplied room key. Not validated.
pub type RoomId = String;

/// Error type for room membership operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    RoomFull { room_id: RoomId, capacity: usize },
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomError::RoomFull { room_id, capacity } => {
                write!(f, "Room {} is full ({} members)", room_id, capacity)
            }
        }
    }
}

impl std::error::Error for RoomError {}

/// Both directions of the membership relation. Only ever touched under one lock.
#[derive(Debug, Default)]
struct Memberships {
    /// room_id -> member connections
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// connection -> rooms it belongs to
    by_connection: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl Memberships {
    fn insert(&mut self, conn: ConnectionId, room_id: &str) -> bool {
        if !self.rooms.contains_key(room_id) {
            tracing::debug!(room_id = %room_id, "Room created");
        }
        let added = self
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn);
        if added {
            self.by_connection
                .entry(conn)
                .or_default()
                .insert(room_id.to_string());
        }
        added
    }

    /// Drop `conn` from the room's member set, reclaiming the room when it empties.
    fn remove_member(&mut self, conn: ConnectionId, room_id: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(&conn);
        if members.is_empty() {
            self.rooms.remove(room_id);
            tracing::debug!(room_id = %room_id, "Room reclaimed");
        }
        removed
    }
}

/// In-memory room membership table.
///
/// Rooms are created on first join and removed as soon as their last member
/// leaves. A single mutex guards both the room -> members and the
/// connection -> rooms maps, so `join`, `leave`, `leave_all` and
/// `members_except` never see one side updated without the other.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    inner: Mutex<Memberships>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Memberships> {
        // No code path panics while holding the guard, so a poisoned lock
        // still holds consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `conn` to `room_id`, creating the room if needed.
    ///
    /// Returns true if the connection was not already a member.
    pub fn join(&self, conn: ConnectionId, room_id: &str) -> bool {
        self.lock().insert(conn, room_id)
    }

    /// Like [`RoomRegistry::join`], but refuses when the room already holds
    /// `capacity` other members. A capacity of `None` or `Some(0)` means unlimited.
    /// Re-joining a room the connection is already in always succeeds.
    pub fn join_capped(
        &self,
        conn: ConnectionId,
        room_id: &str,
        capacity: Option<usize>,
    ) -> Result<bool, RoomError> {
        let mut memberships = self.lock();

        if let Some(max) = capacity {
            if let Some(members) = memberships.rooms.get(room_id) {
                if max > 0 && !members.contains(&conn) && members.len() >= max {
                    return Err(RoomError::RoomFull {
                        room_id: room_id.to_string(),
                        capacity: max,
                    });
                }
            }
        }

        Ok(memberships.insert(conn, room_id))
    }

    /// Remove `conn` from `room_id`. Unknown rooms and non-members are a no-op.
    pub fn leave(&self, conn: ConnectionId, room_id: &str) -> bool {
        let mut memberships = self.lock();

        let removed = memberships.remove_member(conn, room_id);
        if removed {
            if let Some(rooms) = memberships.by_connection.get_mut(&conn) {
                rooms.remove(room_id);
                if rooms.is_empty() {
                    memberships.by_connection.remove(&conn);
                }
            }
        }
        removed
    }

    /// Remove `conn` from every room it belongs to.
    ///
    /// Returns the rooms it was in, sorted.
    pub fn leave_all(&self, conn: ConnectionId) -> Vec<RoomId> {
        let mut memberships = self.lock();

        let Some(rooms) = memberships.by_connection.remove(&conn) else {
            return Vec::new();
        };

        let mut left: Vec<RoomId> = rooms.into_iter().collect();
        for room_id in &left {
            memberships.remove_member(conn, room_id);
        }
        left.sort();
        left
    }

    /// Members of `room_id` other than `exclude`, in no particular order.
    pub fn members_except(&self, room_id: &str, exclude: ConnectionId) -> Vec<ConnectionId> {
        self.lock()
            .rooms
            .get(room_id)
            .map(|members| members.iter().copied().filter(|id| *id != exclude).collect())
            .unwrap_or_default()
    }

    /// All members of `room_id`, sorted by id.
    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .lock()
            .rooms
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Rooms `conn` currently belongs to, sorted.
    pub fn rooms_of(&self, conn: ConnectionId) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .lock()
            .by_connection
            .get(&conn)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.lock().rooms.get(room_id).map_or(0, HashSet::len)
    }

    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }
}
