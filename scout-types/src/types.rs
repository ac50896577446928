//! Query, stream frame and document types.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, SelectionError};

/// An AI backend the search service can route a query to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// DeepSeek hosted models. The initial selection.
    #[default]
    DeepSeek,
    /// Models served by a local Ollama instance.
    Ollama,
    /// GROQ hosted models.
    Groq,
}

impl Provider {
    /// Every known provider, in selector order.
    pub const ALL: [Provider; 3] = [Provider::DeepSeek, Provider::Ollama, Provider::Groq];

    /// Wire identifier, as used for catalog keys and the `model` parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::Ollama => "ollama",
            Self::Groq => "groq",
        }
    }

    /// Human-facing label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::DeepSeek => "DeepSeek",
            Self::Ollama => "Ollama",
            Self::Groq => "GROQ",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SelectionError::UnknownProvider(s.to_string()))
    }
}

/// One search request: free text routed to a provider's model.
///
/// Callers validate the text (non-empty after trimming) and the model
/// (member of the catalog) before building a query; the client sends it as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The search text.
    pub text: String,
    /// Backend to route to.
    pub provider: Provider,
    /// Model name scoped to `provider`.
    pub model: String,
    /// Restrict retrieval to a previously uploaded document.
    pub document_id: Option<String>,
}

impl Query {
    /// Create a query with no document scope.
    pub fn new(text: impl Into<String>, provider: Provider, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider,
            model: model.into(),
            document_id: None,
        }
    }

    /// Scope the query to an uploaded document.
    #[must_use]
    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }
}

/// One decoded event of a streaming search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A fragment of result text. Fragments are appended in arrival order.
    Content(String),
    /// An error reported in-band by the service.
    Error(String),
    /// The stream is complete; nothing follows.
    Done,
}

impl StreamFrame {
    /// Whether this frame ends the stream.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Handle to a streaming search response.
///
/// The receiver yields decoded frames in order. An `Err` item is a transport
/// failure (connection reset, truncated body) and is always the last item; it
/// is distinct from an in-band [`StreamFrame::Error`]. When the request's
/// cancellation token fires, the receiver simply ends.
pub struct FrameStream {
    /// The stream of frames.
    pub receiver: Pin<Box<dyn Stream<Item = Result<StreamFrame, ClientError>> + Send>>,
}

impl fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStream").finish_non_exhaustive()
    }
}

/// A file to be analyzed by the document endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    /// File name sent with the multipart part; the server keys the stored
    /// copy on its extension.
    pub file_name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    /// Create an upload from in-memory contents.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Guess the MIME type from the file extension.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        let ext = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => "application/pdf",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

/// Result of a document upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Server-assigned identifier of the stored document.
    pub document_id: String,
    /// Processing summary from the ingestion step.
    #[serde(default)]
    pub message: serde_json::Value,
    /// AI-generated analysis text. Empty when no model ran.
    #[serde(default)]
    pub analysis: String,
}
