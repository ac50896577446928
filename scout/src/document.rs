//! Reading uploads from disk.

use std::path::Path;

use scout_types::{ClientError, DocumentUpload};

/// Extensions the document endpoint can ingest.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];

/// Read a file into a [`DocumentUpload`] named after its last path component.
///
/// Files whose extension the service does not ingest are refused.
pub async fn read_upload(path: &Path) -> Result<DocumentUpload, ClientError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ClientError::InvalidRequest(format!("{} is not a file", path.display())))?;

    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        });
    if !supported {
        return Err(ClientError::InvalidRequest(format!(
            "unsupported file type: {file_name} (expected .pdf, .docx or .txt)"
        )));
    }

    let bytes = tokio::fs::read(path).await?;
    Ok(DocumentUpload::new(file_name, bytes))
}
