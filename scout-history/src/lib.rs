#![deny(missing_docs)]
//! In-memory view of the user's search and analysis history.
//!
//! The server is the source of truth. [`HistoryStore::refresh`] fetches the
//! current page through a [`HistorySource`] and replaces the whole view, so
//! concurrent refreshes need no coordination: whichever lands last wins, and
//! each one is a complete snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_types::{ClientError, History, HistoryPage};
use tokio::sync::RwLock;

/// Anything that can fetch a page of history from the server.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch one page of history.
    async fn fetch_history(&self, page: HistoryPage) -> Result<History, ClientError>;
}

struct View {
    history: Arc<History>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Passive record of past interactions, replaced wholesale on every refresh.
pub struct HistoryStore {
    view: RwLock<View>,
}

impl HistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            view: RwLock::new(View {
                history: Arc::new(History::default()),
                refreshed_at: None,
            }),
        }
    }

    /// Fetch `page` from `source` and replace the local view with it.
    ///
    /// On failure the previous view is kept and the error returned.
    pub async fn refresh(
        &self,
        source: &dyn HistorySource,
        page: HistoryPage,
    ) -> Result<Arc<History>, ClientError> {
        let history = Arc::new(source.fetch_history(page).await?);
        tracing::debug!(
            searches = history.searches.len(),
            analyses = history.analyses.len(),
            "history refreshed"
        );
        self.replace(Arc::clone(&history)).await;
        Ok(history)
    }

    /// Replace the view with an already fetched history.
    pub async fn replace(&self, history: Arc<History>) {
        let mut view = self.view.write().await;
        view.history = history;
        view.refreshed_at = Some(Utc::now());
    }

    /// The current view.
    pub async fn snapshot(&self) -> Arc<History> {
        Arc::clone(&self.view.read().await.history)
    }

    /// When the view was last replaced, if ever.
    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.view.read().await.refreshed_at
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_types::SearchRecord;
    use std::sync::Mutex;

    /// Replays a fixed queue of results.
    struct Scripted {
        results: Mutex<Vec<Result<History, ClientError>>>,
        pages: Mutex<Vec<HistoryPage>>,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<History, ClientError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                pages: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HistorySource for Scripted {
        async fn fetch_history(&self, page: HistoryPage) -> Result<History, ClientError> {
            self.pages.lock().unwrap().push(page);
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(History::default()))
        }
    }

    fn history_with(queries: &[&str]) -> History {
        History {
            searches: queries
                .iter()
                .map(|q| SearchRecord {
                    query: (*q).to_string(),
                    results: format!("results for {q}"),
                    model_used: "deepseek-chat".into(),
                    created_at: Utc::now(),
                })
                .collect(),
            analyses: Vec::new(),
        }
    }

    #[tokio::test]
    async fn starts_empty() {
        let store = HistoryStore::new();
        assert!(store.snapshot().await.is_empty());
        assert!(store.refreshed_at().await.is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_whole_view() {
        let source = Scripted::new(vec![
            Ok(history_with(&["a", "b"])),
            Ok(history_with(&["c"])),
        ]);
        let store = HistoryStore::new();

        store.refresh(&source, HistoryPage::default()).await.unwrap();
        assert_eq!(store.snapshot().await.searches.len(), 2);

        store.refresh(&source, HistoryPage::default()).await.unwrap();
        let view = store.snapshot().await;
        let queries: Vec<_> = view.searches.iter().map(|s| s.query.as_str()).collect();
        assert_eq!(queries, ["c"]);
        assert!(store.refreshed_at().await.is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_view() {
        let source = Scripted::new(vec![
            Ok(history_with(&["kept"])),
            Err(ClientError::ServiceUnavailable("down".into())),
        ]);
        let store = HistoryStore::new();
        store.refresh(&source, HistoryPage::default()).await.unwrap();

        let err = store
            .refresh(&source, HistoryPage::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.snapshot().await.searches[0].query, "kept");
    }

    #[tokio::test]
    async fn refresh_passes_page_through() {
        let source = Scripted::new(vec![]);
        let store = HistoryStore::new();
        let page = HistoryPage { skip: 20, limit: 5 };
        store.refresh(&source, page).await.unwrap();
        assert_eq!(source.pages.lock().unwrap().as_slice(), [page]);
    }

    #[tokio::test]
    async fn concurrent_refreshes_leave_a_complete_snapshot() {
        let source = Arc::new(Scripted::new(vec![
            Ok(history_with(&["x"])),
            Ok(history_with(&["y", "z"])),
        ]));
        let store = Arc::new(HistoryStore::new());

        let (a, b) = tokio::join!(
            store.refresh(source.as_ref(), HistoryPage::default()),
            store.refresh(source.as_ref(), HistoryPage::default()),
        );
        a.unwrap();
        b.unwrap();

        let len = store.snapshot().await.searches.len();
        assert!(len == 1 || len == 2, "expected a whole snapshot, got {len} records");
    }
}
