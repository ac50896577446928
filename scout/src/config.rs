//! `scout.json` configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_auth::RefreshPolicy;
use scout_types::Provider;
use serde::{Deserialize, Serialize};

/// File read by [`ScoutConfig::load`] when present in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "scout.json";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid JSON for [`ScoutConfig`].
    #[error("parsing {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Identity provider settings for refreshable sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Token endpoint of the realm.
    pub token_url: String,
    /// Public client identifier.
    pub client_id: String,
    /// Secret for confidential clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Client configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Search service base URL.
    pub base_url: String,
    /// Provider selected at start.
    pub default_provider: Provider,
    /// Limit for non-streaming requests, in seconds.
    pub request_timeout_secs: u64,
    /// Seconds between token refresh attempts.
    pub refresh_interval_secs: u64,
    /// A token expiring within this many seconds is refreshed.
    pub refresh_min_validity_secs: u64,
    /// Identity provider, when tokens come from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcConfig>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            base_url: scout_client::DEFAULT_BASE_URL.into(),
            default_provider: Provider::default(),
            request_timeout_secs: scout_client::DEFAULT_TIMEOUT.as_secs(),
            refresh_interval_secs: 60,
            refresh_min_validity_secs: 70,
            oidc: None,
        }
    }
}

impl ScoutConfig {
    /// Read and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), base_url = %config.base_url, "loaded config");
        Ok(config)
    }

    /// Read `path` if given, else [`DEFAULT_CONFIG_FILE`] from `dir` when it
    /// exists, else defaults.
    pub fn load(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_path(path);
        }
        let default_path = dir.join(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::from_path(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh_interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Timeout for non-streaming requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Session refresh schedule.
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            interval: Duration::from_secs(self.refresh_interval_secs),
            min_validity: Duration::from_secs(self.refresh_min_validity_secs),
        }
    }
}
