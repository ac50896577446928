#![deny(missing_docs)]
//! Authentication for the scout client.
//!
//! This crate defines the [`SessionTokenSource`] trait for obtaining and
//! refreshing bearer tokens, and the [`Session`] object that owns the current
//! token for the lifetime of the application.
//!
//! ## Separation of Concerns
//!
//! Token sources produce tokens. The [`Session`] holds the current one,
//! publishes changes to subscribers, and runs the periodic refresh task.
//! Request-issuing components take an `Arc<Session>` and read the token per
//! request; nothing is stored in process-wide state.

mod oidc;
mod session;

pub use oidc::{DEFAULT_TOKEN_TIMEOUT, OidcGrant, OidcTokenSource};
pub use session::{RefreshPolicy, Session};

use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors from token sources.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AuthError {
    /// Authentication failed (bad credentials, revoked refresh token, etc.).
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// Identity backend communication failure.
    #[error("backend error: {0}")]
    BackendError(String),

    /// The session is not logged in.
    #[error("not logged in")]
    NotLoggedIn,

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// An opaque bearer token with optional expiry.
///
/// The token text is zeroed on drop and never printed by `Debug`.
pub struct AuthToken {
    inner: Zeroizing<String>,
    expires_at: Option<SystemTime>,
}

impl AuthToken {
    /// Create a new auth token.
    pub fn new(token: impl Into<String>, expires_at: Option<SystemTime>) -> Self {
        Self {
            inner: Zeroizing::new(token.into()),
            expires_at,
        }
    }

    /// Create a token with no known expiry.
    pub fn permanent(token: impl Into<String>) -> Self {
        Self::new(token, None)
    }

    /// Create a token that expires `lifetime` from now.
    pub fn expiring_in(token: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(token, Some(SystemTime::now() + lifetime))
    }

    /// Scoped exposure of the token text.
    pub fn with_secret<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.inner)
    }

    /// Check if this token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// Whether the token expires within `window` from now. Tokens without a
    /// known expiry never do.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.expires_at
            .map(|exp| SystemTime::now() + window >= exp)
            .unwrap_or(false)
    }

    /// Returns when this token expires, if known.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Supplies bearer tokens for a [`Session`].
#[async_trait]
pub trait SessionTokenSource: Send + Sync {
    /// Obtain a fresh token.
    async fn login(&self) -> Result<AuthToken, AuthError>;

    /// Refresh `current` if it expires within `min_validity`.
    ///
    /// Returns `Ok(None)` when the current token is still good.
    async fn refresh(
        &self,
        current: &AuthToken,
        min_validity: Duration,
    ) -> Result<Option<AuthToken>, AuthError>;

    /// Release whatever the source holds for this session.
    async fn logout(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// A token source that always hands out the same token. It never refreshes.
pub struct StaticTokenSource {
    token: Zeroizing<String>,
}

impl StaticTokenSource {
    /// Create with a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

#[async_trait]
impl SessionTokenSource for StaticTokenSource {
    async fn login(&self) -> Result<AuthToken, AuthError> {
        Ok(AuthToken::permanent(self.token.as_str()))
    }

    async fn refresh(
        &self,
        _current: &AuthToken,
        _min_validity: Duration,
    ) -> Result<Option<AuthToken>, AuthError> {
        Ok(None)
    }
}
