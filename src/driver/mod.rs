//! Chat driver module.
//!
//! This module provides the async entry point for a chat session.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Driver`] | Handle to the task that owns the session |
//! | [`DriverBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Protocol and session options |
//! | [`ReconnectPolicy`] | Backoff schedule for reconnection |
//! | [`CredentialIssuer`] | Source of resume tokens |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use chat_ddp_client::{ClientOptions, Driver, ReconnectPolicy, Result};
//!
//! # async fn example() -> Result<()> {
//! let driver = Driver::builder()
//!     .url("wss://chat.example.com/websocket")
//!     .token("resume-token")
//!     .options(ClientOptions::new().with_reconnect(ReconnectPolicy::new()))
//!     .build()?;
//!
//! driver.connect().await?;
//! driver.wait_until_ready(Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for driver configuration.
pub mod builder;

/// Core driver implementation.
pub mod core;

/// Token issuance.
pub mod credentials;

/// Client options.
pub mod options;

/// Reconnection backoff.
pub mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::DriverBuilder;
pub use core::Driver;
pub use credentials::{CredentialIssuer, StaticToken};
pub use options::ClientOptions;
pub use reconnect::ReconnectPolicy;
