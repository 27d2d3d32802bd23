//! Type-safe identifiers for chat entities.
//!
//! Newtype wrappers prevent mixing a room id with a message id or a call id
//! at compile time. All three are opaque server-assigned strings.
//!
//! | Type | Identifies |
//! |------|------------|
//! | [`RoomId`] | A chat room (`_id` / `rid` on the wire) |
//! | [`MessageId`] | A chat message (`_id`, or synthesized) |
//! | [`CallId`] | A method call or subscription (`id` on the wire) |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Macro
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the identifier is empty.
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            #[inline]
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

// ============================================================================
// Identifiers
// ============================================================================

string_id!(
    /// Identifier of a chat room.
    RoomId
);

string_id!(
    /// Identifier of a chat message.
    ///
    /// Server-assigned when present; otherwise synthesized by the message
    /// store from the message content.
    MessageId
);

string_id!(
    /// Identifier correlating a call or subscription with its response.
    CallId
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    #[test]
    fn test_display_and_as_str() {
        let id = RoomId::new("GENERAL");
        assert_eq!(id.to_string(), "GENERAL");
        assert_eq!(id.as_str(), "GENERAL");
        assert!(!id.is_empty());
        assert!(RoomId::new("").is_empty());
    }

    #[test]
    fn test_serde_transparent() {
        let id: MessageId = serde_json::from_str("\"abc\"").expect("parse");
        assert_eq!(id, MessageId::new("abc"));
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"abc\"");
    }

    #[test]
    fn test_borrow_lookup() {
        let mut map = FxHashMap::default();
        map.insert(CallId::new("room_R1"), 1);
        assert_eq!(map.get("room_R1"), Some(&1));
    }
}
