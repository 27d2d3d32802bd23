//! Chat DDP Client - Realtime chat over a DDP-style WebSocket protocol.
//!
//! This library connects to a chat server that speaks a method-call and
//! subscription protocol over WebSocket, keeps a local model of rooms and
//! messages, and delivers live messages as they arrive.
//!
//! # Architecture
//!
//! The client is split into a synchronous core and an async shell:
//!
//! - **[`ChatClient`]**: Sans-IO state machine. Consumes transport events,
//!   emits frames and [`ClientEvent`]s. Owns every piece of session state.
//! - **[`Driver`]**: Async handle. A single task owns the client, the
//!   WebSocket, reconnection and request timeouts.
//!
//! Key design principles:
//!
//! - One writer: session state is mutated only by the task owning the client
//! - Calls are correlated by id, with the request kind recorded up front
//! - Messages are deduplicated by id and kept in timestamp order
//! - History and live messages merge regardless of arrival order
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use chat_ddp_client::{ClientEvent, Driver, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = Driver::builder()
//!         .url("wss://chat.example.com/websocket")
//!         .token("resume-token")
//!         .build()?;
//!
//!     let mut events = driver.subscribe();
//!     driver.connect().await?;
//!     driver.wait_until_ready(Duration::from_secs(10)).await?;
//!
//!     driver.open_room("GENERAL").await?;
//!     while let Ok(event) = events.recv().await {
//!         if let ClientEvent::MessageReceived { message, .. } = event {
//!             println!("{}: {}", message.author_name, message.text);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Token and room persistence |
//! | [`chat`] | Rooms, messages and subscriptions |
//! | [`driver`] | Async driver and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire frames and payloads |
//! | [`session`] | Connection state machine |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Token and room persistence.
pub mod cache;

/// Chat domain model: rooms, messages, subscriptions.
pub mod chat;

/// Async driver and configuration.
///
/// Use [`Driver::builder()`] to create a configured driver instance.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for chat entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol frames and payloads.
pub mod protocol;

/// Session state machine.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Cache types
pub use cache::{JsonFileCache, MemoryCache, SessionCache};

// Chat types
pub use chat::{Message, MessageStore, Room, RoomDirectory, SubscriptionManager};

// Driver types
pub use driver::{
    ClientOptions, CredentialIssuer, Driver, DriverBuilder, ReconnectPolicy, StaticToken,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, MessageId, RoomId};

// Session types
pub use session::{ChatClient, ClientEvent, ConnectionState};

// Transport types
pub use transport::{CloseReason, Transport, TransportEvent, WsTransport};
