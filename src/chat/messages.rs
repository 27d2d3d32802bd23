//! Per-room message history.
//!
//! History pages and live stream updates arrive interleaved and in no
//! particular timestamp order. The store keeps every room's log sorted by
//! timestamp (stable for equal timestamps) and rejects duplicate ids.
//!
//! # Merge Rules
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`MessageStore::load_initial`] | Replace the log with the batch, keeping live arrivals since the last load |
//! | [`MessageStore::append_live`] | Insertion-sort one message; create the log if absent |
//! | [`MessageStore::get`] | Snapshot copy |

// ============================================================================
// Imports
// ============================================================================

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, RoomId};
use crate::protocol::{Timestamp, WireMessage};

// ============================================================================
// Constants
// ============================================================================

/// Author shown when the payload carries none.
const UNKNOWN_AUTHOR: &str = "unknown";

// ============================================================================
// Message
// ============================================================================

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id (server-assigned or synthesized).
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author display name.
    pub author_name: String,
    /// Message text.
    pub text: String,
    /// Send time.
    pub timestamp: Timestamp,
}

impl Message {
    /// Builds a message for `room_id` from its wire form.
    ///
    /// A missing id is synthesized from the content so that the same
    /// message seen twice deduplicates.
    #[must_use]
    pub fn from_wire(room_id: &RoomId, wire: WireMessage) -> Self {
        let author_name = wire
            .u
            .and_then(|user| user.name.filter(|name| !name.is_empty()).or(user.username))
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        let timestamp = wire.ts.unwrap_or_default();

        let id = match wire.id.filter(|id| !id.is_empty()) {
            Some(id) => MessageId::new(id),
            None => Self::synthesize_id(room_id, timestamp, &author_name, &wire.msg),
        };

        Self {
            id,
            room_id: room_id.clone(),
            author_name,
            text: wire.msg,
            timestamp,
        }
    }

    /// Derives a stable id from the message content.
    #[must_use]
    pub fn synthesize_id(
        room_id: &RoomId,
        timestamp: Timestamp,
        author_name: &str,
        text: &str,
    ) -> MessageId {
        let mut hasher = FxHasher::default();
        room_id.hash(&mut hasher);
        timestamp.hash(&mut hasher);
        author_name.hash(&mut hasher);
        text.hash(&mut hasher);
        MessageId::new(format!("synth-{:016x}", hasher.finish()))
    }
}

// ============================================================================
// RoomMessageLog
// ============================================================================

/// Ordered message history of one room.
#[derive(Debug, Clone, Default)]
pub struct RoomMessageLog {
    /// Messages in non-decreasing timestamp order.
    messages: Vec<Message>,
    /// Ids of `messages`.
    ids: FxHashSet<MessageId>,
    /// Ids appended live since the last initial load.
    live_ids: FxHashSet<MessageId>,
}

impl RoomMessageLog {
    /// Returns the messages in timestamp order.
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the log holds no messages.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns `true` if a message with this id is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Inserts after every message with an equal or earlier timestamp.
    fn insert_sorted(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        let position = self
            .messages
            .partition_point(|existing| existing.timestamp <= message.timestamp);
        self.messages.insert(position, message);
        true
    }
}

// ============================================================================
// MessageStore
// ============================================================================

/// Message logs for every room seen this session.
#[derive(Debug, Default)]
pub struct MessageStore {
    logs: FxHashMap<RoomId, RoomMessageLog>,
}

impl MessageStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the room's log with a history batch.
    ///
    /// The batch is sorted ascending by timestamp and deduplicated. Live
    /// messages appended since the previous load are kept.
    ///
    /// Returns the resulting log length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoom`] if `room_id` is empty.
    pub fn load_initial(&mut self, room_id: &RoomId, messages: Vec<Message>) -> Result<usize> {
        if room_id.is_empty() {
            return Err(Error::invalid_room(room_id.clone()));
        }

        let batch_len = messages.len();
        let previous = self.logs.remove(room_id).unwrap_or_default();
        let carried: Vec<Message> = previous
            .messages
            .into_iter()
            .filter(|message| previous.live_ids.contains(&message.id))
            .collect();
        let carried_len = carried.len();

        let mut merged = messages;
        merged.extend(carried);
        merged.sort_by_key(|message| message.timestamp);

        let mut log = RoomMessageLog::default();
        for message in merged {
            if log.ids.insert(message.id.clone()) {
                log.messages.push(message);
            }
        }

        let len = log.len();
        self.logs.insert(room_id.clone(), log);

        debug!(%room_id, batch = batch_len, carried = carried_len, len, "Room history loaded");
        Ok(len)
    }

    /// Merges one live message into the room's log.
    ///
    /// Creates the log if the history has not loaded yet; the message is
    /// kept across the upcoming initial load.
    ///
    /// Returns `false` if a message with the same id was already present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoom`] if `room_id` is empty.
    pub fn append_live(&mut self, room_id: &RoomId, message: Message) -> Result<bool> {
        if room_id.is_empty() {
            return Err(Error::invalid_room(room_id.clone()));
        }

        let log = self.logs.entry(room_id.clone()).or_default();
        let id = message.id.clone();
        let inserted = log.insert_sorted(message);
        if inserted {
            log.live_ids.insert(id.clone());
        }

        trace!(%room_id, message_id = %id, inserted, "Live message merged");
        Ok(inserted)
    }

    /// Returns a snapshot of the room's messages in timestamp order.
    ///
    /// Unknown rooms yield an empty list.
    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Vec<Message> {
        self.logs
            .get(room_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Returns the room's log, if one exists.
    #[inline]
    #[must_use]
    pub fn log(&self, room_id: &RoomId) -> Option<&RoomMessageLog> {
        self.logs.get(room_id)
    }

    /// Returns the rooms that have a log.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.logs.keys().cloned().collect()
    }

    /// Drops every log.
    pub fn clear(&mut self) {
        self.logs.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
