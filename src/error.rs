//! Error types for the chat client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```no_run
//! use chat_ddp_client::{Driver, Result, RoomId};
//!
//! async fn example(driver: &Driver) -> Result<()> {
//!     driver.open_room(RoomId::new("GENERAL")).await?;
//!     driver.send_message(RoomId::new("GENERAL"), "hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Session | [`Error::NotConnected`], [`Error::NotReady`], [`Error::AuthFailed`] |
//! | Protocol | [`Error::InvalidRoom`], [`Error::UnsolicitedResponse`], [`Error::Protocol`] |
//! | Connection | [`Error::ConnectionTimeout`], [`Error::TransportClosed`] |
//! | Driver | [`Error::DriverStopped`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::{CallId, RoomId};
use crate::session::ConnectionState;
use crate::transport::CloseReason;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Operation attempted while no connection is open.
    #[error("Not connected")]
    NotConnected,

    /// Operation attempted before authentication completed.
    #[error("Session not ready (state: {state})")]
    NotReady {
        /// Connection state at the time of the call.
        state: ConnectionState,
    },

    /// Login was rejected by the server.
    ///
    /// Terminal for the session: the stored token has been cleared and a
    /// new one must be issued out of band.
    #[error("Authentication failed: {message}")]
    AuthFailed {
        /// Server-provided reason.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Operation referenced an empty or unknown room id.
    #[error("Invalid room: '{room_id}'")]
    InvalidRoom {
        /// The offending room id.
        room_id: RoomId,
    },

    /// A response arrived with no matching pending call.
    ///
    /// Logged and otherwise ignored by the client.
    #[error("Unsolicited response: {id}")]
    UnsolicitedResponse {
        /// The unmatched call id.
        id: CallId,
    },

    /// Protocol violation or unexpected payload.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection attempt exceeded the configured timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The transport closed while the operation was in flight.
    #[error("Transport closed: {reason}")]
    TransportClosed {
        /// Why the transport closed.
        reason: CloseReason,
    },

    // ========================================================================
    // Driver Errors
    // ========================================================================
    /// The driver task is no longer running.
    #[error("Driver stopped")]
    DriverStopped,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a not-ready error for the given state.
    #[inline]
    pub fn not_ready(state: ConnectionState) -> Self {
        Self::NotReady { state }
    }

    /// Creates an authentication failure.
    #[inline]
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid room error.
    #[inline]
    pub fn invalid_room(room_id: RoomId) -> Self {
        Self::InvalidRoom { room_id }
    }

    /// Creates an unsolicited response error.
    #[inline]
    pub fn unsolicited(id: CallId) -> Self {
        Self::UnsolicitedResponse { id }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a transport closed error.
    #[inline]
    pub fn transport_closed(reason: CloseReason) -> Self {
        Self::TransportClosed { reason }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionTimeout { .. } | Self::TransportClosed { .. }
        )
    }

    /// Returns `true` if the error ends the session.
    ///
    /// The user-facing layer must obtain new credentials.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthFailed { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed once the caller reconnects or waits
    /// for the session to become ready.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::NotReady { .. }
                | Self::ConnectionTimeout { .. }
                | Self::TransportClosed { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
