//! Credential issuance.
//!
//! The client never sees passwords. When the session needs a token, the
//! driver asks a [`CredentialIssuer`], which may run any login flow out of
//! band and hand back an opaque resume token.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::{Error, Result};

// ============================================================================
// CredentialIssuer
// ============================================================================

/// Source of resume tokens.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Obtains a fresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be issued.
    async fn issue_token(&self) -> Result<String>;
}

// ============================================================================
// StaticToken
// ============================================================================

/// Issuer that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Creates an issuer for `token`.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialIssuer for StaticToken {
    async fn issue_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(Error::auth_failed("No token configured"));
        }
        Ok(self.token.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
