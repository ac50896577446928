//! Application-level errors.

use scout_auth::AuthError;
use scout_types::ClientError;

use crate::config::ConfigError;

/// Errors that end a command before or outside a workbench action.
///
/// Failures inside an action (a search, an upload) become notices instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkbenchError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No session could be established.
    #[error("authentication: {0}")]
    Auth(#[from] AuthError),
    /// A request outside an action failed (login, register).
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Neither a token nor credentials were supplied.
    #[error("no credentials: pass --token, or --email and --password (or set SCOUT_TOKEN)")]
    MissingCredentials,
}
