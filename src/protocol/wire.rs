//! Wire payload types.
//!
//! Shapes of the `result` payloads and stream arguments as the server
//! sends them. Domain types in [`crate::chat`] are built from these.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

// ============================================================================
// Timestamp
// ============================================================================

/// Milliseconds since the Unix epoch.
///
/// Encoded on the wire as EJSON `{"$date": <ms>}`; a bare integer is also
/// accepted when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from milliseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns milliseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Ejson {
        #[serde(rename = "$date")]
        date: i64,
    },
    Millis(i64),
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TimestampRepr::Ejson { date: self.0 }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match TimestampRepr::deserialize(deserializer)? {
            TimestampRepr::Ejson { date } | TimestampRepr::Millis(date) => Ok(Self(date)),
        }
    }
}

// ============================================================================
// Rooms
// ============================================================================

/// A room as returned by `rooms/get`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireRoom {
    /// Room id.
    #[serde(rename = "_id")]
    pub id: String,

    /// Room name (absent for direct messages).
    #[serde(default)]
    pub name: Option<String>,

    /// Display name.
    #[serde(default)]
    pub fname: Option<String>,

    /// Time of the last message.
    #[serde(default)]
    pub lm: Option<Timestamp>,

    /// Time of the last room update.
    #[serde(rename = "_updatedAt", default)]
    pub updated_at: Option<Timestamp>,
}

/// Result of `rooms/get`.
///
/// The server answers a `since` query with a delta object, and a query
/// without params with a bare array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RoomsResult {
    /// `{ update: [...], remove: [...] }`
    Delta {
        /// Rooms changed since the query time.
        #[serde(default)]
        update: Vec<WireRoom>,
    },
    /// `[...]`
    List(Vec<WireRoom>),
}

impl RoomsResult {
    /// Returns the rooms in the result.
    #[must_use]
    pub fn into_rooms(self) -> Vec<WireRoom> {
        match self {
            Self::Delta { update } => update,
            Self::List(rooms) => rooms,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Author of a message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WireUser {
    /// User id.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    /// Login name.
    #[serde(default)]
    pub username: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A message as carried by history results and the live stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireMessage {
    /// Message id, when the server provides one.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,

    /// Room id.
    #[serde(default)]
    pub rid: Option<String>,

    /// Message text. `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub msg: String,

    /// Author.
    #[serde(default)]
    pub u: Option<WireUser>,

    /// Send time.
    #[serde(default)]
    pub ts: Option<Timestamp>,
}

/// Result of `loadHistory`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryResult {
    /// Messages, newest first as sent by the server.
    ///
    /// Entries that do not decode are skipped.
    #[serde(default, deserialize_with = "skip_malformed")]
    pub messages: Vec<WireMessage>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn skip_malformed<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<WireMessage>, D::Error> {
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Skipping malformed history message");
                None
            }
        })
        .collect())
}

// ============================================================================
// Login
// ============================================================================

/// Result of a successful `login`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResult {
    /// Authenticated user id.
    #[serde(default)]
    pub id: Option<String>,

    /// Refreshed resume token.
    #[serde(default)]
    pub token: Option<String>,

    /// Token expiry.
    #[serde(rename = "tokenExpires", default)]
    pub token_expires: Option<Timestamp>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_timestamp_accepts_both_forms() {
        let ejson: Timestamp = serde_json::from_value(json!({"$date": 1500})).expect("parse");
        let bare: Timestamp = serde_json::from_value(json!(1500)).expect("parse");
        assert_eq!(ejson, bare);
        assert_eq!(ejson.as_millis(), 1500);
    }

    #[test]
    fn test_timestamp_serializes_as_ejson() {
        let value = serde_json::to_value(Timestamp::from_millis(42)).expect("serialize");
        assert_eq!(value, json!({"$date": 42}));
    }

    #[test]
    fn test_rooms_result_delta() {
        let result: RoomsResult = serde_json::from_value(json!({
            "update": [{"_id": "GENERAL", "name": "general", "lm": {"$date": 10}}],
            "remove": []
        }))
        .expect("parse");

        let rooms = result.into_rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "GENERAL");
        assert_eq!(rooms[0].lm, Some(Timestamp::from_millis(10)));
    }

    #[test]
    fn test_rooms_result_list() {
        let result: RoomsResult =
            serde_json::from_value(json!([{"_id": "a"}, {"_id": "b", "fname": "Bee"}]))
                .expect("parse");
        assert_eq!(result.into_rooms().len(), 2);
    }

    #[test]
    fn test_history_result() {
        let result: HistoryResult = serde_json::from_value(json!({
            "messages": [{
                "_id": "m1",
                "rid": "R1",
                "msg": "hello",
                "u": {"_id": "u1", "username": "ann", "name": "Ann"},
                "ts": {"$date": 1000}
            }],
            "unreadNotLoaded": 0
        }))
        .expect("parse");

        let message = &result.messages[0];
        assert_eq!(message.id.as_deref(), Some("m1"));
        assert_eq!(message.u.as_ref().and_then(|u| u.name.as_deref()), Some("Ann"));
        assert_eq!(message.ts, Some(Timestamp::from_millis(1000)));
    }

    #[test]
    fn test_null_text_reads_as_empty() {
        let message: WireMessage =
            serde_json::from_value(json!({"_id": "m1", "msg": null})).expect("parse");
        assert_eq!(message.msg, "");
    }

    #[test]
    fn test_history_result_skips_malformed_entries() {
        let result: HistoryResult = serde_json::from_value(json!({
            "messages": [
                {"_id": "m1", "msg": "one", "ts": {"$date": 1000}},
                {"_id": "m2", "msg": "two", "ts": "yesterday"},
                {"_id": "m3", "msg": "three", "ts": {"$date": 3000}}
            ]
        }))
        .expect("parse");

        let ids: Vec<_> = result.messages.iter().filter_map(|m| m.id.as_deref()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
    }

    #[test]
    fn test_login_result() {
        let result: LoginResult = serde_json::from_value(json!({
            "id": "u1",
            "token": "fresh",
            "tokenExpires": {"$date": 99}
        }))
        .expect("parse");
        assert_eq!(result.token.as_deref(), Some("fresh"));
    }
}
