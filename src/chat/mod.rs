//! Chat state synchronized from the server.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RoomDirectory`] | Snapshot of the rooms the user belongs to |
//! | [`MessageStore`] | Per-room ordered, deduplicated message history |
//! | [`SubscriptionManager`] | Which rooms have a live feed open |
//!
//! None of these types perform I/O. They are owned and driven by
//! [`crate::ChatClient`], which is the only writer.

// ============================================================================
// Submodules
// ============================================================================

/// Per-room message history.
pub mod messages;

/// Room snapshot.
pub mod rooms;

/// Live feed tracking.
pub mod subscriptions;

// ============================================================================
// Re-exports
// ============================================================================

pub use messages::{Message, MessageStore, RoomMessageLog};
pub use rooms::{Room, RoomDirectory};
pub use subscriptions::{Subscription, SubscriptionManager, SubscriptionPhase};
