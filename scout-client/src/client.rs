//! Search service client struct and builder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use scout_auth::Session;
use scout_history::HistorySource;
use scout_types::{
    ClientError, DocumentAnalysis, DocumentUpload, FrameStream, History, HistoryPage,
    ModelCatalog, Provider, Query,
};
use tokio_util::sync::CancellationToken;

use crate::error::{map_http_status, map_reqwest_error, read_json};
use crate::streaming::stream_frames;
use crate::types::MessageResponse;

/// Default search service base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default limit for non-streaming requests. Document analysis runs long.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for the search service API.
///
/// Every request carries the session's current bearer token, read at send
/// time so a refresh between requests is picked up without rebuilding the
/// client.
///
/// # Example
///
/// ```no_run
/// # async fn demo(session: std::sync::Arc<scout_auth::Session>) {
/// use scout_client::ScoutClient;
///
/// let client = ScoutClient::new(session).base_url("http://localhost:8000");
/// # }
/// ```
pub struct ScoutClient {
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) session: Arc<Session>,
    pub(crate) client: reqwest::Client,
}

impl ScoutClient {
    /// Create a client against [`DEFAULT_BASE_URL`].
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
            session,
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

    /// The session requests are authorized with.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ClientError> {
        let token = self
            .session
            .current_token()
            .ok_or(ClientError::Unauthenticated)?;
        Ok(token.with_secret(|t| builder.bearer_auth(t)))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self
            .authorized(builder)?
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.timeout))?;
        read_json(response, self.timeout).await
    }

    /// Open a streaming search.
    ///
    /// The request timeout does not apply; a stream runs until the service
    /// ends it or `cancel` fires.
    ///
    /// Resolves once the response headers arrive. A non-success status is
    /// returned as an error here; afterwards all failures arrive through the
    /// stream. Cancelling `cancel` before the response arrives returns
    /// [`ClientError::Canceled`]; cancelling later ends the stream.
    pub async fn search_stream(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<FrameStream, ClientError> {
        let url = self.endpoint("/api/search/stream");
        let mut params: Vec<(&str, &str)> = vec![
            ("query", query.text.as_str()),
            ("model", query.provider.as_str()),
            ("model_name", query.model.as_str()),
        ];
        if let Some(document_id) = &query.document_id {
            params.push(("document_id", document_id.as_str()));
        }

        tracing::debug!(
            url = %url,
            provider = %query.provider,
            model = %query.model,
            document = ?query.document_id,
            "opening search stream"
        );

        let request = self.authorized(
            self.client
                .get(&url)
                .query(&params)
                .header(ACCEPT, "text/event-stream"),
        )?;

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Canceled),
            result = request.send() => result.map_err(|e| map_reqwest_error(e, self.timeout))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| map_reqwest_error(e, self.timeout))?;
            return Err(map_http_status(status, &body));
        }

        Ok(stream_frames(response, cancel, self.timeout))
    }

    /// Upload a document for ingestion and analysis by `provider`/`model`.
    pub async fn process_document(
        &self,
        upload: DocumentUpload,
        provider: Provider,
        model: &str,
    ) -> Result<DocumentAnalysis, ClientError> {
        let url = self.endpoint("/api/process-document");
        let mime = upload.mime_type();
        let size = upload.bytes.len();
        tracing::debug!(url = %url, file = %upload.file_name, size, %provider, model, "uploading document");

        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(mime)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid MIME type {mime}: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("model", provider.as_str())
            .text("model_name", model.to_string());

        self.send_json(self.client.post(&url).multipart(form)).await
    }

    /// Delete an uploaded document. Returns the service's acknowledgement.
    pub async fn delete_document(&self, document_id: &str) -> Result<String, ClientError> {
        if document_id.is_empty() || document_id.contains(['/', '?', '#']) {
            return Err(ClientError::InvalidRequest(format!(
                "invalid document id: {document_id:?}"
            )));
        }
        let url = self.endpoint(&format!("/api/documents/{document_id}"));
        tracing::debug!(url = %url, "deleting document");

        let response: MessageResponse = self.send_json(self.client.delete(&url)).await?;
        Ok(response.message)
    }

    /// Fetch the provider to model-list catalog.
    pub async fn models(&self) -> Result<ModelCatalog, ClientError> {
        let url = self.endpoint("/api/models");
        tracing::debug!(url = %url, "fetching model catalog");
        self.send_json(self.client.get(&url)).await
    }

    /// Fetch one page of the user's history.
    pub async fn history(&self, page: HistoryPage) -> Result<History, ClientError> {
        let url = self.endpoint("/api/history");
        tracing::debug!(url = %url, skip = page.skip, limit = page.limit, "fetching history");
        self.send_json(
            self.client
                .get(&url)
                .query(&[("skip", page.skip), ("limit", page.limit)]),
        )
        .await
    }
}

#[async_trait]
impl HistorySource for ScoutClient {
    async fn fetch_history(&self, page: HistoryPage) -> Result<History, ClientError> {
        self.history(page).await
    }
}
