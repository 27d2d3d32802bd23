//! WebSocket transport layer.
//!
//! This module owns the single long-lived connection to the chat server.
//! It knows how to move frames, not what they mean.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  ChatClient     │   send(text)                 │  Chat server    │
//! │                 │─────────┐                    │                 │
//! │                 │         ▼      WebSocket     │                 │
//! │  handle_event ◄─┼── WsTransport ◄─────────────►│  DDP endpoint   │
//! │                 │   TransportEvent             │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `WsTransport::open` - Spawn the connection task, return immediately
//! 2. `TransportEvent::Opened` - Exactly once, when the handshake succeeds
//! 3. `TransportEvent::Message` - One per decoded server frame
//! 4. `TransportEvent::Closed` - Exactly once, ends the connection's lifetime
//!
//! No retry logic lives here; reconnection is the driver's concern.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | tokio-tungstenite connection and event loop |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::Result;
use crate::protocol::ServerFrame;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::WsTransport;

// ============================================================================
// Transport
// ============================================================================

/// Outbound half of a connection.
///
/// Implementations must fail with [`crate::Error::NotConnected`] when the
/// connection is not open.
pub trait Transport: Send {
    /// Queues one text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotConnected`] if the connection is not open.
    fn send(&self, text: String) -> Result<()>;

    /// Requests a graceful close.
    ///
    /// A [`TransportEvent::Closed`] follows once the connection is down.
    fn close(&self);
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle and data events emitted by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is established.
    Opened,
    /// A decoded server frame.
    Message(ServerFrame),
    /// The connection is gone.
    Closed(CloseReason),
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by either side with a close frame.
    Normal,
    /// Closed by an I/O or protocol error.
    Error(String),
    /// Connecting did not complete in time.
    Timeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Error(message) => write!(f, "error: {message}"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::Normal.to_string(), "normal");
        assert_eq!(CloseReason::Timeout.to_string(), "timeout");
        assert_eq!(
            CloseReason::Error("reset".into()).to_string(),
            "error: reset"
        );
    }
}
