//! Session management.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChatClient`] | Connect → authenticate → ready state machine |
//! | [`Correlator`] | Pending-call table keyed by [`crate::CallId`] |
//! | [`Session`] | Auth token and [`ConnectionState`] |

// ============================================================================
// Submodules
// ============================================================================

/// Protocol state machine.
pub mod client;

/// Call correlation.
pub mod correlator;

/// Connection state and session data.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ChatClient, ClientEvent};
pub use correlator::{Correlator, PendingRequest, RequestKind};
pub use state::{ConnectionState, Session};
