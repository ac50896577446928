//! Request and response bodies that only exist on the wire.

use serde::{Deserialize, Serialize};

/// Body of `POST /token`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Only bearer tokens can be attached to requests. A missing type is
    /// taken to mean bearer.
    pub fn is_bearer(&self) -> bool {
        self.token_type
            .as_deref()
            .is_none_or(|t| t.eq_ignore_ascii_case("bearer"))
    }
}

/// Body of `DELETE /api/documents/{id}` and other acknowledgements.
#[derive(Debug, Deserialize)]
pub(crate) struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// A new account, as sent to `POST /register`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Registration {
    /// Login address; also the `username` field of the token form.
    pub email: String,
    /// Display name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Registration {
    /// Describe a new account.
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.password);
    }
}
