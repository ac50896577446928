//! The application session: current token plus its refresh task.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{AuthError, AuthToken, SessionTokenSource};

/// When and how eagerly the session refreshes its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Time between refresh attempts. Clamped to at least one second.
    pub interval: Duration,
    /// A token expiring within this window is refreshed.
    pub min_validity: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            min_validity: Duration::from_secs(70),
        }
    }
}

struct Refresher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type TokenSlot = Option<Arc<AuthToken>>;

/// An authenticated session.
///
/// Created by [`Session::start`], which logs in through the token source and
/// spawns a periodic refresh task. The task lives until [`Session::logout`]
/// (or drop). Refresh failures are logged and the current token stays in
/// use; they never end the session.
///
/// Components that issue requests hold an `Arc<Session>` and read
/// [`Session::current_token`] per request. [`Session::subscribe`] notifies
/// on every token change, including logout.
pub struct Session {
    source: Arc<dyn SessionTokenSource>,
    token: Arc<watch::Sender<TokenSlot>>,
    refresher: Mutex<Option<Refresher>>,
}

impl Session {
    /// Log in through `source` and start refreshing per `policy`.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn start(
        source: Arc<dyn SessionTokenSource>,
        policy: RefreshPolicy,
    ) -> Result<Self, AuthError> {
        let token = source.login().await?;
        tracing::info!(expires_at = ?token.expires_at(), "session started");

        let (tx, _) = watch::channel(Some(Arc::new(token)));
        let token = Arc::new(tx);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(refresh_loop(
            Arc::clone(&source),
            Arc::clone(&token),
            policy,
            cancel.clone(),
        ));

        Ok(Self {
            source,
            token,
            refresher: Mutex::new(Some(Refresher { cancel, handle })),
        })
    }

    /// The current token, if logged in.
    pub fn current_token(&self) -> Option<Arc<AuthToken>> {
        self.token.borrow().clone()
    }

    /// Whether the session holds a token.
    pub fn is_authenticated(&self) -> bool {
        self.token.borrow().is_some()
    }

    /// Receive every token change.
    pub fn subscribe(&self) -> watch::Receiver<TokenSlot> {
        self.token.subscribe()
    }

    /// Stop the refresh task, drop the token and log out of the source.
    ///
    /// Calling it again is a no-op apart from the source's own `logout`.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let refresher = self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Refresher { cancel, handle }) = refresher {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "token refresh task ended abnormally");
            }
        }
        self.token.send_replace(None);
        tracing::info!("session ended");
        self.source.logout().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let refresher = self
            .refresher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(refresher) = refresher {
            refresher.cancel.cancel();
        }
    }
}

async fn refresh_loop(
    source: Arc<dyn SessionTokenSource>,
    token: Arc<watch::Sender<TokenSlot>>,
    policy: RefreshPolicy,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(policy.interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the token was just issued.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(current) = token.borrow().clone() else {
            continue;
        };

        let refreshed = tokio::select! {
            () = cancel.cancelled() => break,
            result = source.refresh(&current, policy.min_validity) => result,
        };

        match refreshed {
            Ok(Some(fresh)) => {
                tracing::info!(expires_at = ?fresh.expires_at(), "token refreshed");
                token.send_replace(Some(Arc::new(fresh)));
            }
            Ok(None) => tracing::trace!("token still valid"),
            Err(e) => tracing::warn!(error = %e, "token refresh failed, keeping current token"),
        }
    }
    tracing::debug!("token refresh task stopped");
}
