//! OpenID Connect token source (password and refresh-token grants).

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::{AuthError, AuthToken, SessionTokenSource};

/// Default bound on a single token request.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// How an [`OidcTokenSource`] obtains its first token.
pub enum OidcGrant {
    /// Resource-owner password credentials.
    Password {
        /// Account name.
        username: String,
        /// Account password.
        password: Zeroizing<String>,
    },
    /// A refresh token obtained elsewhere (e.g. a browser login).
    RefreshToken(Zeroizing<String>),
}

impl OidcGrant {
    /// Password grant.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Refresh-token grant.
    pub fn refresh_token(token: impl Into<String>) -> Self {
        Self::RefreshToken(Zeroizing::new(token.into()))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Token source backed by an OIDC token endpoint (Keycloak and friends).
///
/// Keeps the latest refresh token it was issued and uses it when the session
/// asks for a refresh of a token about to expire.
pub struct OidcTokenSource {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<Zeroizing<String>>,
    grant: OidcGrant,
    timeout: Duration,
    refresh_token: Mutex<Option<Zeroizing<String>>>,
}

impl OidcTokenSource {
    /// Create a source for `token_url` (the realm's `.../protocol/openid-connect/token`).
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>, grant: OidcGrant) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            grant,
            timeout: DEFAULT_TOKEN_TIMEOUT,
            refresh_token: Mutex::new(None),
        }
    }

    /// Authenticate the client itself (confidential clients).
    #[must_use]
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(Zeroizing::new(secret.into()));
        self
    }

    /// Bound each token request (default [`DEFAULT_TOKEN_TIMEOUT`]).
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

    fn stored_refresh_token(&self) -> Option<Zeroizing<String>> {
        self.refresh_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn request_token(&self, grant_fields: &[(&str, &str)]) -> Result<AuthToken, AuthError> {
        let mut form: Vec<(&str, &str)> = vec![("client_id", self.client_id.as_str())];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        form.extend_from_slice(grant_fields);

        let grant_type = grant_fields.first().map(|(_, v)| *v).unwrap_or_default();
        tracing::debug!(url = %self.token_url, grant_type, "requesting token");

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::BackendError(format!(
                        "token endpoint timed out after {}s",
                        self.timeout.as_secs_f64()
                    ))
                } else {
                    AuthError::BackendError(format!("token endpoint unreachable: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::BackendError(format!("reading token response: {e}")))?;

        match status.as_u16() {
            200..=299 => {}
            400 | 401 | 403 => return Err(AuthError::AuthFailed(body)),
            _ => return Err(AuthError::BackendError(format!("HTTP {status}: {body}"))),
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::BackendError(format!("invalid token response: {e}")))?;

        if let Some(refresh) = parsed.refresh_token {
            *self.refresh_token.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(Zeroizing::new(refresh));
        }

        let expires_at = parsed
            .expires_in
            .map(|secs| SystemTime::now() + Duration::from_secs(secs));
        Ok(AuthToken::new(parsed.access_token, expires_at))
    }
}

#[async_trait]
impl SessionTokenSource for OidcTokenSource {
    async fn login(&self) -> Result<AuthToken, AuthError> {
        match &self.grant {
            OidcGrant::Password { username, password } => {
                self.request_token(&[
                    ("grant_type", "password"),
                    ("username", username.as_str()),
                    ("password", password.as_str()),
                ])
                .await
            }
            OidcGrant::RefreshToken(initial) => {
                let refresh = self.stored_refresh_token().unwrap_or_else(|| initial.clone());
                self.request_token(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh.as_str()),
                ])
                .await
            }
        }
    }

    async fn refresh(
        &self,
        current: &AuthToken,
        min_validity: Duration,
    ) -> Result<Option<AuthToken>, AuthError> {
        if !current.expires_within(min_validity) {
            return Ok(None);
        }
        let refresh = self
            .stored_refresh_token()
            .or_else(|| match &self.grant {
                OidcGrant::RefreshToken(initial) => Some(initial.clone()),
                OidcGrant::Password { .. } => None,
            })
            .ok_or_else(|| AuthError::AuthFailed("no refresh token issued".into()))?;

        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh.as_str()),
        ])
        .await
        .map(Some)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.refresh_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}
