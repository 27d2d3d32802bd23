//! WebSocket protocol message types.
//!
//! This module defines the frames exchanged with the chat server. Every
//! frame is one JSON object discriminated by its `msg` field.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `connect` | Client → Server | Handshake declaring supported versions |
//! | `method` | Client → Server | Method call (`login`, `rooms/get`, ...) |
//! | `sub` / `unsub` | Client → Server | Open / close a live feed |
//! | `pong` | Client → Server | Heartbeat reply |
//! | `ping` | Server → Client | Heartbeat |
//! | `result` | Server → Client | Method call response |
//! | `updated` | Server → Client | Method side effects acknowledged |
//! | `ready` / `nosub` | Server → Client | Subscription accepted / ended |
//! | `changed` | Server → Client | Live feed update |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Client and server frame envelopes |
//! | `method` | Typed method calls and their params |
//! | `wire` | Payload shapes (rooms, messages, timestamps) |

// ============================================================================
// Submodules
// ============================================================================

/// Client and server frame envelopes.
pub mod frame;

/// Typed method calls.
pub mod method;

/// Wire payload types.
pub mod wire;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{ClientFrame, MethodError, ServerFrame, StreamEvent};
pub use method::{MethodCall, STREAM_ROOM_MESSAGES};
pub use wire::{HistoryResult, LoginResult, RoomsResult, Timestamp, WireMessage, WireRoom, WireUser};
