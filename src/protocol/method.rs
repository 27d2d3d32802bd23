//! Typed method calls.
//!
//! Each [`MethodCall`] knows its wire name and how to lay out its
//! positional params.
//!
//! | Variant | Method | Params |
//! |---------|--------|--------|
//! | `Login` | `login` | `[{ resume: token }]` |
//! | `GetRooms` | `rooms/get` | `[{ $date: since }]` |
//! | `OpenRoom` | `openRoom` | `[rid]` |
//! | `LoadHistory` | `loadHistory` | `[rid, before, limit, { $date: lastUpdate }]` |
//! | `SendMessage` | `sendMessage` | `[{ rid, msg }]` |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::identifiers::{CallId, RoomId};

use super::frame::ClientFrame;
use super::wire::Timestamp;

// ============================================================================
// Constants
// ============================================================================

/// Publication carrying live room messages.
pub const STREAM_ROOM_MESSAGES: &str = "stream-room-messages";

// ============================================================================
// MethodCall
// ============================================================================

/// A method invocation, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodCall {
    /// Resume a session with an existing auth token.
    Login {
        /// Opaque resume token.
        token: String,
    },

    /// List the rooms the user belongs to, changed since `since`.
    GetRooms {
        /// Lower bound on room update time (`0` for all).
        since: Timestamp,
    },

    /// Mark a room as opened by the user.
    OpenRoom {
        /// Room to open.
        room_id: RoomId,
    },

    /// Fetch a page of room history.
    LoadHistory {
        /// Room to load.
        room_id: RoomId,
        /// Only messages older than this (`None` for now).
        before: Option<Timestamp>,
        /// Maximum number of messages.
        limit: u32,
        /// Client's last update marker.
        last_update: Timestamp,
    },

    /// Post a message to a room.
    SendMessage {
        /// Target room.
        room_id: RoomId,
        /// Message text.
        text: String,
    },
}

impl MethodCall {
    /// Returns the wire method name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::GetRooms { .. } => "rooms/get",
            Self::OpenRoom { .. } => "openRoom",
            Self::LoadHistory { .. } => "loadHistory",
            Self::SendMessage { .. } => "sendMessage",
        }
    }

    /// Returns the positional params array.
    #[must_use]
    pub fn params(&self) -> Value {
        match self {
            Self::Login { token } => json!([{ "resume": token }]),
            Self::GetRooms { since } => json!([since]),
            Self::OpenRoom { room_id } => json!([room_id]),
            Self::LoadHistory {
                room_id,
                before,
                limit,
                last_update,
            } => json!([room_id, before, limit, last_update]),
            Self::SendMessage { room_id, text } => json!([{ "rid": room_id, "msg": text }]),
        }
    }

    /// Wraps the call in a `method` frame with the given id.
    #[must_use]
    pub fn into_frame(self, id: CallId) -> ClientFrame {
        ClientFrame::Method {
            id,
            method: self.name().to_string(),
            params: self.params(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_frame() {
        let frame = MethodCall::Login {
            token: "tok".into(),
        }
        .into_frame(CallId::new("login"));

        let value = serde_json::to_value(frame).expect("serialize");
        assert_eq!(
            value,
            json!({"msg": "method", "id": "login", "method": "login", "params": [{"resume": "tok"}]})
        );
    }

    #[test]
    fn test_get_rooms_params() {
        let call = MethodCall::GetRooms {
            since: Timestamp::EPOCH,
        };
        assert_eq!(call.name(), "rooms/get");
        assert_eq!(call.params(), json!([{"$date": 0}]));
    }

    #[test]
    fn test_load_history_params() {
        let call = MethodCall::LoadHistory {
            room_id: RoomId::new("R1"),
            before: None,
            limit: 10,
            last_update: Timestamp::EPOCH,
        };
        assert_eq!(call.params(), json!(["R1", null, 10, {"$date": 0}]));
    }

    #[test]
    fn test_send_message_params() {
        let call = MethodCall::SendMessage {
            room_id: RoomId::new("R1"),
            text: "hello".into(),
        };
        assert_eq!(call.name(), "sendMessage");
        assert_eq!(call.params(), json!([{"rid": "R1", "msg": "hello"}]));
    }
}
