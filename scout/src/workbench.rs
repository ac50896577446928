//! The application controller behind the command line.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::{Stream, StreamExt};
use scout_client::ScoutClient;
use scout_history::HistoryStore;
use scout_types::{
    ClientError, DocumentUpload, HistoryPage, ModelCatalog, ModelSelection, Provider, Query,
    SelectionError, StreamFrame,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::buffer::ResultBuffer;
use crate::notice::Notice;

/// How a user action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran to completion.
    Completed,
    /// The action was superseded or canceled. No notice is emitted.
    Canceled,
    /// The service or transport failed; a notice was emitted.
    Failed,
    /// Refused before any request (empty query, no model); a notice was
    /// emitted.
    Rejected,
}

/// The action that currently owns the result buffer.
struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

/// Owns the provider/model selection, the result buffer and the single
/// in-flight action, and reports the outcome of every action as a
/// [`Notice`].
///
/// Methods take `&self`; share it in an `Arc` to cancel from another task.
pub struct Workbench {
    client: Arc<ScoutClient>,
    history: Arc<HistoryStore>,
    history_page: HistoryPage,
    catalog: RwLock<Arc<ModelCatalog>>,
    selection: Mutex<ModelSelection>,
    buffer: ResultBuffer,
    in_flight: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
    last_document: Mutex<Option<String>>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Workbench {
    /// Create a workbench with `provider` selected and an empty catalog.
    ///
    /// The receiver yields every notice the workbench emits; it closes when
    /// the workbench is dropped.
    pub fn new(
        client: Arc<ScoutClient>,
        history: Arc<HistoryStore>,
        provider: Provider,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let workbench = Self {
            client,
            history,
            history_page: HistoryPage::default(),
            catalog: RwLock::new(Arc::new(ModelCatalog::new())),
            selection: Mutex::new(ModelSelection::new(provider)),
            buffer: ResultBuffer::new(),
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(1),
            last_document: Mutex::new(None),
            notices: tx,
        };
        (workbench, rx)
    }

    /// Page requested by [`Workbench::refresh_history`].
    #[must_use]
    pub fn with_history_page(mut self, page: HistoryPage) -> Self {
        self.history_page = page;
        self
    }

    /// The result buffer of the current or last action.
    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    /// The shared history view.
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// The loaded model catalog.
    pub fn catalog(&self) -> Arc<ModelCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy of the current selection.
    pub fn selection(&self) -> ModelSelection {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identifier of the most recently analyzed document.
    pub fn last_document(&self) -> Option<String> {
        self.last_document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!(level = ?notice.level, message = %notice.message, "notice");
        if self.notices.send(notice).is_err() {
            tracing::trace!("notice dropped, nobody listening");
        }
    }

    /// Fetch the catalog, then the history.
    pub async fn load(&self) -> ActionOutcome {
        match self.load_catalog().await {
            ActionOutcome::Completed => self.refresh_history().await,
            other => other,
        }
    }

    /// Fetch the model catalog and re-validate the selection against it.
    pub async fn load_catalog(&self) -> ActionOutcome {
        match self.client.models().await {
            Ok(catalog) => {
                self.install_catalog(catalog);
                ActionOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(error = %e, "loading model catalog failed");
                self.notify(Notice::error(format!("Could not load models: {e}")));
                ActionOutcome::Failed
            }
        }
    }

    fn install_catalog(&self, catalog: ModelCatalog) {
        let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
        selection.reconcile(&catalog);
        tracing::debug!(
            provider = %selection.provider(),
            model = ?selection.model(),
            "model catalog loaded"
        );
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
    }

    /// Switch provider; the model resets to its first catalog entry or unset.
    pub fn select_provider(&self, provider: Provider) {
        let catalog = self.catalog();
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .select_provider(provider, &catalog);
    }

    /// Select a model of the current provider.
    pub fn select_model(&self, model: &str) -> Result<(), SelectionError> {
        let catalog = self.catalog();
        let result = self
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .select_model(model, &catalog);
        if let Err(e) = &result {
            self.notify(Notice::warning(e.to_string()));
        }
        result
    }

    /// Cancel the previous action and claim the buffer for a new one that
    /// writes into it from empty.
    fn begin(&self) -> (u64, CancellationToken) {
        let claimed = self.supersede();
        self.buffer.clear();
        claimed
    }

    /// Cancel the previous action and register a new one. The buffer keeps
    /// its text until the new action writes.
    fn supersede(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(InFlight {
                id,
                cancel: cancel.clone(),
            });
        if let Some(previous) = previous {
            tracing::debug!(previous = previous.id, next = id, "superseding in-flight action");
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    /// Release the buffer if `id` still owns it.
    fn end(&self, id: u64) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.as_ref().is_some_and(|f| f.id == id) {
            *in_flight = None;
        }
    }

    /// Request cancellation of the in-flight action. Returns whether there
    /// was one.
    pub fn cancel(&self) -> bool {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match in_flight {
            Some(f) => {
                tracing::debug!(action = f.id, "canceling in-flight action");
                f.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn model_for_action(&self) -> Option<(Provider, String)> {
        let selection = self.selection();
        let model = selection.model()?.to_string();
        Some((selection.provider(), model))
    }

    /// Run a streaming search, appending content to the buffer as it arrives.
    ///
    /// Any in-flight action is canceled first. An in-band error frame ends
    /// the useful content; the rest of the stream is dropped.
    pub async fn search(&self, text: &str, document_id: Option<&str>) -> ActionOutcome {
        let text = text.trim();
        if text.is_empty() {
            self.notify(Notice::warning("Enter a search query"));
            return ActionOutcome::Rejected;
        }
        let Some((provider, model)) = self.model_for_action() else {
            self.notify(Notice::warning("Select a model first"));
            return ActionOutcome::Rejected;
        };

        let (id, cancel) = self.begin();
        let mut query = Query::new(text, provider, model);
        if let Some(document_id) = document_id {
            query = query.with_document(document_id);
        }

        let outcome = self.consume_search(&query, &cancel).await;
        self.end(id);

        if outcome == ActionOutcome::Completed {
            self.refresh_history().await;
        }
        outcome
    }

    async fn consume_search(&self, query: &Query, cancel: &CancellationToken) -> ActionOutcome {
        match self.client.search_stream(query, cancel.clone()).await {
            Ok(stream) => self.apply_frames(stream.receiver, cancel).await,
            Err(e) => self.fail_unless_canceled(cancel, "Search failed", &e),
        }
    }

    /// Apply frames to the buffer in arrival order. A stream that delivered
    /// `Done` has completed, whatever happens to the token afterwards.
    async fn apply_frames<S>(&self, mut frames: S, cancel: &CancellationToken) -> ActionOutcome
    where
        S: Stream<Item = Result<StreamFrame, ClientError>> + Unpin,
    {
        while let Some(item) = frames.next().await {
            match item {
                Ok(StreamFrame::Content(fragment)) => {
                    if !self.buffer.append(cancel, &fragment) {
                        break;
                    }
                }
                Ok(StreamFrame::Error(message)) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::warn!(error = %message, "search stream reported an error");
                    self.notify(Notice::error(format!("Search failed: {message}")));
                    return ActionOutcome::Failed;
                }
                Ok(StreamFrame::Done) => return ActionOutcome::Completed,
                Err(e) => return self.fail_unless_canceled(cancel, "Search failed", &e),
            }
        }

        if cancel.is_cancelled() {
            ActionOutcome::Canceled
        } else {
            ActionOutcome::Completed
        }
    }

    fn fail_unless_canceled(
        &self,
        cancel: &CancellationToken,
        what: &str,
        err: &ClientError,
    ) -> ActionOutcome {
        if cancel.is_cancelled() || err.is_canceled() {
            tracing::debug!(error = %err, "action canceled");
            return ActionOutcome::Canceled;
        }
        tracing::warn!(error = %err, "{what}");
        self.notify(Notice::error(format!("{what}: {err}")));
        ActionOutcome::Failed
    }

    /// Upload a document for analysis; on success the analysis replaces the
    /// buffer wholesale. A failed upload leaves the previous text in place.
    pub async fn analyze_document(&self, upload: DocumentUpload) -> ActionOutcome {
        let Some((provider, model)) = self.model_for_action() else {
            self.notify(Notice::warning("Select a model first"));
            return ActionOutcome::Rejected;
        };
        if upload.bytes.is_empty() {
            self.notify(Notice::warning(format!("{} is empty", upload.file_name)));
            return ActionOutcome::Rejected;
        }

        let (id, cancel) = self.supersede();
        let file_name = upload.file_name.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ClientError::Canceled),
            result = self.client.process_document(upload, provider, &model) => result,
        };
        self.end(id);

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => return self.fail_unless_canceled(&cancel, "Document analysis failed", &e),
        };
        if !self.buffer.replace(&cancel, &analysis.analysis) {
            return ActionOutcome::Canceled;
        }
        tracing::debug!(document = %analysis.document_id, file = %file_name, "document analyzed");
        *self.last_document.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(analysis.document_id.clone());
        self.notify(Notice::info(format!(
            "Analyzed {file_name} (document {})",
            analysis.document_id
        )));

        self.refresh_history().await;
        ActionOutcome::Completed
    }

    /// Read `path` and analyze it.
    pub async fn analyze_path(&self, path: &Path) -> ActionOutcome {
        match crate::document::read_upload(path).await {
            Ok(upload) => self.analyze_document(upload).await,
            Err(e) => {
                self.notify(Notice::error(format!("Could not read {}: {e}", path.display())));
                ActionOutcome::Rejected
            }
        }
    }

    /// Delete an uploaded document.
    pub async fn delete_document(&self, document_id: &str) -> ActionOutcome {
        match self.client.delete_document(document_id).await {
            Ok(message) => {
                let mut last = self.last_document.lock().unwrap_or_else(PoisonError::into_inner);
                if last.as_deref() == Some(document_id) {
                    *last = None;
                }
                drop(last);
                let message = if message.is_empty() {
                    format!("Deleted document {document_id}")
                } else {
                    message
                };
                self.notify(Notice::info(message));
                ActionOutcome::Completed
            }
            Err(e) => {
                tracing::warn!(error = %e, document = document_id, "deleting document failed");
                self.notify(Notice::error(format!("Could not delete document: {e}")));
                ActionOutcome::Failed
            }
        }
    }

    /// Reload the history view. A failure keeps the previous view.
    pub async fn refresh_history(&self) -> ActionOutcome {
        match self
            .history
            .refresh(self.client.as_ref(), self.history_page)
            .await
        {
            Ok(_) => ActionOutcome::Completed,
            Err(e) => {
                tracing::warn!(error = %e, "refreshing history failed");
                self.notify(Notice::error(format!("Could not load history: {e}")));
                ActionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use futures::channel::mpsc as chan;
    use scout_auth::{RefreshPolicy, Session, StaticTokenSource};

    async fn workbench() -> (Workbench, mpsc::UnboundedReceiver<Notice>) {
        let session = Session::start(
            Arc::new(StaticTokenSource::new("t")),
            RefreshPolicy::default(),
        )
        .await
        .unwrap();
        // Never contacted: frames are fed straight into the workbench.
        let client = ScoutClient::new(Arc::new(session)).base_url("http://127.0.0.1:9");
        Workbench::new(
            Arc::new(client),
            Arc::new(HistoryStore::new()),
            Provider::DeepSeek,
        )
    }

    #[tokio::test]
    async fn done_wins_over_a_late_cancel() {
        let (wb, mut notices) = workbench().await;
        let (_id, cancel) = wb.begin();

        let trip = cancel.clone();
        let frames = futures::stream::iter([
            Ok(StreamFrame::Content("all".into())),
            Ok(StreamFrame::Done),
        ])
        .inspect(move |item| {
            if matches!(item, Ok(StreamFrame::Done)) {
                trip.cancel();
            }
        });

        let outcome = wb.apply_frames(Box::pin(frames), &cancel).await;
        assert_eq!(outcome, ActionOutcome::Completed);
        assert_eq!(wb.buffer().snapshot(), "all");
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_mid_stream_keeps_what_landed() {
        let (wb, mut notices) = workbench().await;
        let (_id, cancel) = wb.begin();

        let (body, chunks) = chan::unbounded::<Result<Bytes, ClientError>>();
        let frames = Box::pin(scout_client::decode_frames(chunks, cancel.clone()));
        let mut seen = wb.buffer().subscribe();

        let feed = async {
            body.unbounded_send(Ok(Bytes::from_static(b"data: {\"content\":\"first\"}\n")))
                .unwrap();
            seen.changed().await.unwrap();
            assert!(wb.cancel());
            // The decoder may already have dropped its end.
            let _ = body.unbounded_send(Ok(Bytes::from_static(
                b"data: {\"content\":\" second\"}\ndata: [DONE]\n",
            )));
            body.close_channel();
        };

        let (outcome, ()) = tokio::join!(wb.apply_frames(frames, &cancel), feed);
        assert_eq!(outcome, ActionOutcome::Canceled);
        assert_eq!(wb.buffer().snapshot(), "first");
        assert!(notices.try_recv().is_err());
        assert!(!wb.cancel(), "nothing left in flight");
    }
}
