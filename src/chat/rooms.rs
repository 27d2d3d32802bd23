//! Room snapshot.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identifiers::RoomId;
use crate::protocol::{Timestamp, WireRoom};

// ============================================================================
// Room
// ============================================================================

/// A room the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room id.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Time of the last activity in the room.
    pub last_activity: Timestamp,
}

impl From<WireRoom> for Room {
    fn from(wire: WireRoom) -> Self {
        let name = wire
            .name
            .filter(|name| !name.is_empty())
            .or(wire.fname)
            .unwrap_or_else(|| wire.id.clone());

        Self {
            id: RoomId::new(wire.id),
            name,
            last_activity: wire.lm.or(wire.updated_at).unwrap_or_default(),
        }
    }
}

// ============================================================================
// RoomDirectory
// ============================================================================

/// Point-in-time set of rooms, keyed by id.
///
/// Replaced wholesale on every fetch; there are no incremental updates.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: FxHashMap<RoomId, Room>,
    fetched: bool,
}

impl RoomDirectory {
    /// Creates an empty directory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the directory from a cached snapshot.
    ///
    /// The directory still counts as not fetched for this session.
    pub fn seed(&mut self, rooms: Vec<Room>) {
        self.rooms = rooms.into_iter().map(|room| (room.id.clone(), room)).collect();
        debug!(count = self.rooms.len(), "Room directory seeded from cache");
    }

    /// Replaces the whole set with a server snapshot.
    ///
    /// Returns the number of rooms now held.
    pub fn replace(&mut self, rooms: impl IntoIterator<Item = Room>) -> usize {
        self.rooms = rooms.into_iter().map(|room| (room.id.clone(), room)).collect();
        self.fetched = true;
        debug!(count = self.rooms.len(), "Room directory replaced");
        self.rooms.len()
    }

    /// Returns the room with the given id.
    #[inline]
    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Returns `true` if the room is known.
    #[inline]
    #[must_use]
    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Returns all rooms, most recently active first, then by name.
    #[must_use]
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        rooms
    }

    /// Returns `true` once a server snapshot has been applied.
    #[inline]
    #[must_use]
    pub fn is_fetched(&self) -> bool {
        self.fetched
    }

    /// Returns the number of rooms.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no rooms are known.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Forgets every room.
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.fetched = false;
    }

    /// Marks the snapshot stale so the next session refetches it.
    pub fn invalidate(&mut self) {
        self.fetched = false;
    }
}

// ============================================================================
// Tests
// ============================================================================
