//! Builder pattern for driver configuration.
//!
//! Provides a fluent API for configuring and creating [`Driver`] instances.
//!
//! # Example
//!
//! ```no_run
//! use chat_ddp_client::Driver;
//!
//! # async fn example() -> chat_ddp_client::Result<()> {
//! let driver = Driver::builder()
//!     .url("wss://chat.example.com/websocket")
//!     .token("resume-token")
//!     .build()?;
//!
//! driver.connect().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::cache::SessionCache;
use crate::error::{Error, Result};
use crate::session::ChatClient;

use super::core::Driver;
use super::credentials::CredentialIssuer;
use super::options::ClientOptions;

// ============================================================================
// DriverBuilder
// ============================================================================

/// Builder for configuring a [`Driver`] instance.
///
/// Use [`Driver::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct DriverBuilder {
    /// Server WebSocket endpoint.
    url: Option<String>,
    /// Resume token.
    token: Option<String>,
    /// Session cache.
    cache: Option<Arc<dyn SessionCache>>,
    /// Token source used when the session needs authentication.
    issuer: Option<Arc<dyn CredentialIssuer>>,
    /// Client options.
    options: ClientOptions,
}

impl fmt::Debug for DriverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBuilder")
            .field("url", &self.url)
            .field("has_token", &self.token.is_some())
            .field("has_cache", &self.cache.is_some())
            .field("has_issuer", &self.issuer.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// DriverBuilder Implementation
// ============================================================================

impl DriverBuilder {
    /// Creates a new driver builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from the environment.
    ///
    /// Reads the server URL from `CHAT_WS_URL` and the options from
    /// [`ClientOptions::from_env`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an option variable is malformed.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::new().options(ClientOptions::from_env()?);
        if let Ok(url) = env::var("CHAT_WS_URL") {
            builder = builder.url(url);
        }
        Ok(builder)
    }

    /// Sets the server WebSocket endpoint.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` URL (e.g., "wss://chat.example.com/websocket")
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the resume token.
    ///
    /// Takes precedence over a token found in the cache.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the session cache.
    #[inline]
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the credential issuer consulted when a token is needed.
    #[inline]
    #[must_use]
    pub fn credential_issuer(mut self, issuer: Arc<dyn CredentialIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Sets the client options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the driver with validation and starts its task.
    ///
    /// The driver does not connect until [`Driver::connect`] is called.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing, malformed, or not `ws`/`wss`
    /// - [`Error::Config`] if the options are invalid
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> Result<Driver> {
        let url = self.validate_url()?;
        self.options.validate()?;

        let mut client = ChatClient::new(self.options);
        if let Some(token) = self.token.filter(|token| !token.is_empty()) {
            client = client.with_token(token);
        }
        if let Some(cache) = self.cache {
            client = client.with_cache(cache);
        }

        Ok(Driver::new(url, client, self.issuer))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl DriverBuilder {
    /// Validates the server URL.
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Server URL is required. Use .url() to set it.\n\
                 Example: Driver::builder().url(\"wss://chat.example.com/websocket\")",
            )
        })?;

        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("Invalid server URL '{raw}': {e}")))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(Error::config(format!(
                "Server URL must use ws:// or wss://, got '{scheme}://'"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
