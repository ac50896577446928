//! Account endpoints of the search service: password login and registration.

use std::time::Duration;

use async_trait::async_trait;
use scout_auth::{AuthError, AuthToken, SessionTokenSource};
use scout_types::ClientError;
use zeroize::Zeroizing;

use crate::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::{map_reqwest_error, read_json};
use crate::types::{MessageResponse, Registration, TokenResponse};

/// Unauthenticated client for `/token` and `/register`.
#[derive(Clone)]
pub struct Accounts {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl Accounts {
    /// Create against [`DEFAULT_BASE_URL`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Override the service base URL. A trailing `/` is dropped.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Exchange email and password for a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthToken, ClientError> {
        let url = format!("{}/token", self.base_url);
        tracing::debug!(url = %url, email, "logging in");

        let response = self
            .client
            .post(&url)
            .form(&[("username", email), ("password", password)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;
        let token: TokenResponse = read_json(response, self.timeout).await?;
        if !token.is_bearer() {
            return Err(ClientError::Decode(format!(
                "unsupported token type {}",
                token.token_type.as_deref().unwrap_or_default()
            )));
        }
        Ok(AuthToken::permanent(token.access_token))
    }

    /// Create an account. Returns the service's acknowledgement, if any.
    pub async fn register(&self, registration: &Registration) -> Result<String, ClientError> {
        let url = format!("{}/register", self.base_url);
        tracing::debug!(url = %url, email = %registration.email, "registering account");

        let response = self
            .client
            .post(&url)
            .json(registration)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;
        let ack: MessageResponse = read_json(response, self.timeout).await?;
        Ok(ack.message)
    }
}

impl Default for Accounts {
    fn default() -> Self {
        Self::new()
    }
}

/// Session token source that logs in with email and password.
///
/// Tokens from `/token` carry no expiry, so refresh only ever happens for a
/// token that was given one elsewhere; it is done by logging in again.
pub struct PasswordTokenSource {
    accounts: Accounts,
    email: String,
    password: Zeroizing<String>,
}

impl PasswordTokenSource {
    /// Log in as `email` through `accounts`.
    pub fn new(accounts: Accounts, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            accounts,
            email: email.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

fn to_auth_error(err: ClientError) -> AuthError {
    match err {
        ClientError::Unauthorized(detail) | ClientError::InvalidRequest(detail) => {
            AuthError::AuthFailed(detail)
        }
        other => AuthError::BackendError(other.to_string()),
    }
}

#[async_trait]
impl SessionTokenSource for PasswordTokenSource {
    async fn login(&self) -> Result<AuthToken, AuthError> {
        self.accounts
            .login(&self.email, &self.password)
            .await
            .map_err(to_auth_error)
    }

    async fn refresh(
        &self,
        current: &AuthToken,
        min_validity: Duration,
    ) -> Result<Option<AuthToken>, AuthError> {
        if !current.expires_within(min_validity) {
            return Ok(None);
        }
        self.login().await.map(Some)
    }
}
