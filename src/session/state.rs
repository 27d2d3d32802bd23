//! Connection state and session data.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::debug;

// ============================================================================
// ConnectionState
// ============================================================================

/// Where the session is in the connect → authenticate → ready lifecycle.
///
/// ```text
/// Disconnected ─open─► Connecting ─opened─► Connected ─login─► Authenticating ─ok─► Ready
///      ▲                                                            │
///      └──────────────── closed (any state) ◄─────────── Failed ◄───┘ rejected
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Transport opening.
    Connecting,
    /// Transport open, handshake sent.
    Connected,
    /// Resume login in flight.
    Authenticating,
    /// Authenticated; room and message operations allowed.
    Ready,
    /// Unrecoverable error (rejected login or protocol version).
    Failed,
}

impl ConnectionState {
    /// Returns `true` if frames may be sent in this state.
    #[inline]
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticating | Self::Ready)
    }

    /// Returns `true` once authenticated.
    #[inline]
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` if [`crate::ChatClient::open`] is allowed.
    #[inline]
    #[must_use]
    pub const fn can_open(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Authentication and lifecycle state of one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Opaque resume token.
    auth_token: Option<String>,
    /// Current lifecycle state.
    state: ConnectionState,
    /// Server-assigned session id from the handshake.
    server_session: Option<String>,
}

impl Session {
    /// Creates a disconnected session, optionally holding a token.
    #[must_use]
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            auth_token: auth_token.filter(|token| !token.is_empty()),
            ..Self::default()
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the stored token.
    #[inline]
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Returns the server session id, once the handshake is acknowledged.
    #[inline]
    #[must_use]
    pub fn server_session(&self) -> Option<&str> {
        self.server_session.as_deref()
    }

    /// Moves to `next`. Returns `false` if already there.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        debug!(from = %self.state, to = %next, "Session state changed");
        self.state = next;
        if next == ConnectionState::Disconnected {
            self.server_session = None;
        }
        true
    }

    pub(crate) fn set_token(&mut self, token: Option<String>) {
        self.auth_token = token.filter(|token| !token.is_empty());
    }

    pub(crate) fn set_server_session(&mut self, session: Option<String>) {
        self.server_session = session;
    }
}

// ============================================================================
// Tests
// ============================================================================
