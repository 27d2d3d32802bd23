//! Client configuration options.
//!
//! Provides a type-safe interface for tuning protocol behavior such as the
//! history page size, protocol versions, and request/connect timeouts.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use chat_ddp_client::{ClientOptions, ReconnectPolicy};
//!
//! let options = ClientOptions::new()
//!     .with_history_limit(50)
//!     .with_max_subscriptions(8)
//!     .with_request_timeout(Duration::from_secs(20))
//!     .with_reconnect(ReconnectPolicy::default());
//! ```
//!
//! # Environment
//!
//! | Variable | Option |
//! |----------|--------|
//! | `CHAT_HISTORY_LIMIT` | [`ClientOptions::history_limit`] |
//! | `CHAT_MAX_SUBSCRIPTIONS` | [`ClientOptions::max_subscriptions`] |
//! | `CHAT_REQUEST_TIMEOUT_MS` | [`ClientOptions::request_timeout`] |

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::connection::DEFAULT_CONNECT_TIMEOUT;

use super::reconnect::ReconnectPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default number of messages loaded when a room is opened.
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Protocol version requested in the handshake.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1";

/// Protocol versions offered in the handshake.
pub const DEFAULT_SUPPORTED_VERSIONS: [&str; 3] = ["1", "pre2", "pre1"];

/// Upper bound on the history page size.
const MAX_HISTORY_LIMIT: u32 = 1000;

// ============================================================================
// ClientOptions
// ============================================================================

/// Chat client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Messages requested per history load.
    pub history_limit: u32,

    /// Protocol version requested in the handshake.
    pub protocol_version: String,

    /// Protocol versions offered in the handshake.
    pub supported_versions: Vec<String>,

    /// Maximum number of rooms kept subscribed; `None` for no bound.
    pub max_subscriptions: Option<usize>,

    /// Pending calls older than this are abandoned; `None` waits forever.
    pub request_timeout: Option<Duration>,

    /// Bound on each connection attempt.
    pub connect_timeout: Duration,

    /// Automatic reconnection; `None` leaves reconnecting to the caller.
    pub reconnect: Option<ReconnectPolicy>,

    /// Re-open previously open rooms once a new session is ready.
    pub resubscribe_on_ready: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            supported_versions: DEFAULT_SUPPORTED_VERSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_subscriptions: None,
            request_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: None,
            resubscribe_on_ready: false,
        }
    }

    /// Creates default options overridden by environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but cannot be parsed,
    /// or the result fails validation.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::new();

        if let Some(limit) = read_env::<u32>("CHAT_HISTORY_LIMIT")? {
            options.history_limit = limit;
        }
        if let Some(max) = read_env::<usize>("CHAT_MAX_SUBSCRIPTIONS")? {
            options.max_subscriptions = Some(max);
        }
        if let Some(ms) = read_env::<u64>("CHAT_REQUEST_TIMEOUT_MS")? {
            options.request_timeout = Some(Duration::from_millis(ms));
        }

        options.validate()?;
        Ok(options)
    }
}

fn read_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} has an invalid value: '{value}'"))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the number of messages loaded when a room is opened.
    #[inline]
    #[must_use]
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the handshake protocol version and the versions offered.
    #[must_use]
    pub fn with_protocol_versions(
        mut self,
        version: impl Into<String>,
        supported: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.protocol_version = version.into();
        self.supported_versions = supported.into_iter().map(Into::into).collect();
        self
    }

    /// Bounds the number of rooms kept subscribed.
    #[inline]
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = Some(max);
        self
    }

    /// Abandons pending calls older than `timeout`.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the bound on each connection attempt.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables automatic reconnection.
    ///
    /// Also re-opens the previously open rooms once the new session is
    /// ready.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self.resubscribe_on_ready = true;
        self
    }

    /// Sets whether previously open rooms are re-opened on ready.
    #[inline]
    #[must_use]
    pub fn with_resubscribe_on_ready(mut self, enabled: bool) -> Self {
        self.resubscribe_on_ready = enabled;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(Error::config(format!(
                "History limit must be between 1 and {MAX_HISTORY_LIMIT}, got {}",
                self.history_limit
            )));
        }

        if self.protocol_version.is_empty() {
            return Err(Error::config("Protocol version must not be empty"));
        }

        if !self.supported_versions.contains(&self.protocol_version) {
            return Err(Error::config(format!(
                "Supported versions must include '{}'",
                self.protocol_version
            )));
        }

        if self.max_subscriptions == Some(0) {
            return Err(Error::config("Max subscriptions must be greater than zero"));
        }

        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }

        if let Some(policy) = &self.reconnect {
            policy.validate()?;
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = ClientOptions::new();
        assert_eq!(options.history_limit, 10);
        assert_eq!(options.protocol_version, "1");
        assert_eq!(options.supported_versions, vec!["1", "pre2", "pre1"]);
        assert!(options.max_subscriptions.is_none());
        assert!(options.request_timeout.is_none());
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert!(options.reconnect.is_none());
        assert!(!options.resubscribe_on_ready);
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new()
            .with_history_limit(50)
            .with_max_subscriptions(4)
            .with_request_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(2));

        assert_eq!(options.history_limit, 50);
        assert_eq!(options.max_subscriptions, Some(4));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.connect_timeout, Duration::from_secs(2));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_with_reconnect_enables_resubscribe() {
        let options = ClientOptions::new().with_reconnect(ReconnectPolicy::default());
        assert!(options.reconnect.is_some());
        assert!(options.resubscribe_on_ready);
    }

    #[test]
    fn test_validate_zero_history_limit() {
        let options = ClientOptions::new().with_history_limit(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_version_must_be_supported() {
        let options = ClientOptions::new().with_protocol_versions("2", ["1"]);
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("'2'"));
    }

    #[test]
    fn test_validate_zero_max_subscriptions() {
        let options = ClientOptions::new().with_max_subscriptions(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_read_env_unset_is_none() {
        let value = read_env::<u32>("CHAT_DDP_CLIENT_TEST_UNSET_VARIABLE").expect("unset");
        assert!(value.is_none());
    }
}
