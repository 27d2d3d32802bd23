//! Client and server frame envelopes.
//!
//! Frames are internally tagged by `msg`. Server frame kinds this client
//! does not act upon (`added`, `removed`, ...) decode to
//! [`ServerFrame::Unknown`] instead of failing.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{CallId, RoomId};

use super::method::STREAM_ROOM_MESSAGES;

// ============================================================================
// ClientFrame
// ============================================================================

/// A frame sent from the client to the server.
///
/// # Format
///
/// ```json
/// { "msg": "method", "id": "room_GENERAL", "method": "openRoom", "params": ["GENERAL"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Protocol handshake.
    Connect {
        /// Preferred protocol version.
        version: String,
        /// All versions the client can speak.
        support: Vec<String>,
    },

    /// Method call.
    Method {
        /// Correlation id.
        id: CallId,
        /// Method name.
        method: String,
        /// Positional parameters.
        params: Value,
    },

    /// Open a live feed.
    Sub {
        /// Correlation id, reused by `unsub`.
        id: CallId,
        /// Publication name.
        name: String,
        /// Publication parameters.
        params: Value,
    },

    /// Close a live feed.
    Unsub {
        /// Id the feed was opened with.
        id: CallId,
    },

    /// Heartbeat reply.
    Pong {
        /// Echo of the ping id, when the server sent one.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientFrame {
    /// Creates the handshake frame.
    #[must_use]
    pub fn connect(version: impl Into<String>, support: &[String]) -> Self {
        Self::Connect {
            version: version.into(),
            support: support.to_vec(),
        }
    }

    /// Creates a pong answering a ping with the given id.
    #[inline]
    #[must_use]
    pub fn pong(id: Option<String>) -> Self {
        Self::Pong { id }
    }

    /// Creates a subscription to a room's message stream.
    #[must_use]
    pub fn subscribe_room(id: CallId, room_id: &RoomId) -> Self {
        Self::Sub {
            id,
            name: STREAM_ROOM_MESSAGES.to_string(),
            params: serde_json::json!([room_id, { "useCollection": false, "args": [] }]),
        }
    }

    /// Serializes the frame to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// ServerFrame
// ============================================================================

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Heartbeat request; must be answered with a pong.
    Ping {
        /// Optional ping id.
        #[serde(default)]
        id: Option<String>,
    },

    /// Heartbeat reply.
    Pong {
        /// Optional pong id.
        #[serde(default)]
        id: Option<String>,
    },

    /// Handshake accepted.
    Connected {
        /// Server-side session id.
        #[serde(default)]
        session: Option<String>,
    },

    /// Handshake rejected (no common version).
    Failed {
        /// Version the server proposes instead.
        #[serde(default)]
        version: Option<String>,
    },

    /// Method call response.
    Result {
        /// Id of the call being answered.
        id: CallId,
        /// Result payload on success.
        #[serde(default)]
        result: Option<Value>,
        /// Error payload on failure.
        #[serde(default)]
        error: Option<MethodError>,
    },

    /// The listed calls' side effects have been applied.
    Updated {
        /// Ids of the acknowledged calls.
        #[serde(default)]
        methods: Vec<CallId>,
    },

    /// The listed subscriptions are live.
    Ready {
        /// Ids of the ready subscriptions.
        #[serde(default)]
        subs: Vec<CallId>,
    },

    /// A subscription was refused or ended by the server.
    Nosub {
        /// Id of the subscription.
        id: CallId,
        /// Optional reason.
        #[serde(default)]
        error: Option<MethodError>,
    },

    /// Live feed update.
    Changed {
        /// Publication name.
        collection: String,
        /// Update payload.
        #[serde(default)]
        fields: Option<Value>,
    },

    /// Server-side protocol error.
    Error {
        /// Description of the error.
        #[serde(default)]
        reason: Option<String>,
    },

    /// Any frame kind this client does not handle.
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Decodes a server frame from JSON text.
    ///
    /// Objects without a `msg` field, such as the `{"server_id": ..}`
    /// greeting, decode as [`ServerFrame::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the text is not a valid frame.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if value.is_object() && value.get("msg").is_none() {
            return Ok(Self::Unknown);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the room stream event carried by a `changed` frame.
    ///
    /// Returns `None` for any other frame or collection.
    #[must_use]
    pub fn stream_event(&self) -> Option<StreamEvent> {
        match self {
            Self::Changed {
                collection,
                fields: Some(fields),
            } if collection == STREAM_ROOM_MESSAGES => {
                serde_json::from_value(fields.clone()).ok()
            }
            _ => None,
        }
    }
}

// ============================================================================
// MethodError
// ============================================================================

/// Error payload of a failed call or subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodError {
    /// Error code (number or string).
    #[serde(default)]
    pub error: Value,

    /// Short reason.
    #[serde(default)]
    pub reason: Option<String>,

    /// Human readable message.
    #[serde(default)]
    pub message: Option<String>,

    /// Error class name.
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
}

impl MethodError {
    /// Returns the most descriptive text available.
    #[must_use]
    pub fn describe(&self) -> String {
        if let Some(message) = self.message.as_ref().or(self.reason.as_ref()) {
            return message.clone();
        }
        match &self.error {
            Value::String(code) => code.clone(),
            Value::Null => "unknown error".to_string(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// StreamEvent
// ============================================================================

/// Payload of a `changed` frame on the room message stream.
///
/// `event_name` is the room id; `args[0]` is the message object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamEvent {
    /// Room the event belongs to.
    #[serde(rename = "eventName")]
    pub event_name: String,

    /// Event arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_pong_without_id_is_bare() {
        let json = ClientFrame::pong(None).to_json().expect("serialize");
        assert_eq!(json, r#"{"msg":"pong"}"#);
    }

    #[test]
    fn test_pong_echoes_id() {
        let json = ClientFrame::pong(Some("7".into())).to_json().expect("serialize");
        assert_eq!(json, r#"{"msg":"pong","id":"7"}"#);
    }

    #[test]
    fn test_connect_frame() {
        let support = vec!["1".to_string(), "pre2".to_string(), "pre1".to_string()];
        let value = serde_json::to_value(ClientFrame::connect("1", &support)).expect("serialize");
        assert_eq!(
            value,
            json!({"msg": "connect", "version": "1", "support": ["1", "pre2", "pre1"]})
        );
    }

    #[test]
    fn test_subscribe_room_frame() {
        let frame = ClientFrame::subscribe_room(CallId::new("sub_R1"), &RoomId::new("R1"));
        let value = serde_json::to_value(frame).expect("serialize");
        assert_eq!(
            value,
            json!({
                "msg": "sub",
                "id": "sub_R1",
                "name": "stream-room-messages",
                "params": ["R1", {"useCollection": false, "args": []}]
            })
        );
    }

    #[test]
    fn test_parse_ping() {
        let frame = ServerFrame::from_json(r#"{"msg":"ping"}"#).expect("parse");
        assert_eq!(frame, ServerFrame::Ping { id: None });
    }

    #[test]
    fn test_parse_result_with_error() {
        let frame = ServerFrame::from_json(
            r#"{"msg":"result","id":"login","error":{"error":403,"reason":"You've been logged out by the server."}}"#,
        )
        .expect("parse");

        match frame {
            ServerFrame::Result { id, result, error } => {
                assert_eq!(id.as_str(), "login");
                assert!(result.is_none());
                let error = error.expect("error payload");
                assert_eq!(error.describe(), "You've been logged out by the server.");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_kind() {
        let frame = ServerFrame::from_json(r#"{"msg":"added","collection":"users","id":"u1"}"#)
            .expect("parse");
        assert_eq!(frame, ServerFrame::Unknown);
    }

    #[test]
    fn test_parse_server_greeting() {
        let frame = ServerFrame::from_json(r#"{"server_id":"0"}"#).expect("parse");
        assert_eq!(frame, ServerFrame::Unknown);
    }

    #[test]
    fn test_stream_event_extraction() {
        let frame = ServerFrame::from_json(
            r#"{"msg":"changed","collection":"stream-room-messages","id":"id",
                "fields":{"eventName":"R1","args":[{"_id":"m1","msg":"hi"}]}}"#,
        )
        .expect("parse");

        let event = frame.stream_event().expect("stream event");
        assert_eq!(event.event_name, "R1");
        assert_eq!(event.args.len(), 1);
    }

    #[test]
    fn test_stream_event_ignores_other_collections() {
        let frame = ServerFrame::Changed {
            collection: "stream-notify-user".into(),
            fields: Some(json!({"eventName": "x", "args": []})),
        };
        assert!(frame.stream_event().is_none());
    }

    #[test]
    fn test_method_error_describe_falls_back_to_code() {
        let error: MethodError =
            serde_json::from_value(json!({"error": "not-found"})).expect("parse");
        assert_eq!(error.describe(), "not-found");
    }
}
