//! Internal helpers for mapping HTTP/reqwest errors to [`ClientError`].

use std::time::Duration;

use scout_types::ClientError;
use serde::de::DeserializeOwned;

/// Map a non-success HTTP status from the search service to a [`ClientError`].
///
/// The service reports failures as `{"detail": ...}`; when the body has that
/// shape only the detail is kept.
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ClientError {
    let detail = error_detail(body);
    match status.as_u16() {
        401 | 403 => ClientError::Unauthorized(detail),
        404 => ClientError::NotFound(detail),
        400 | 422 => ClientError::InvalidRequest(detail),
        500..=599 => ClientError::ServiceUnavailable(detail),
        _ => ClientError::InvalidRequest(format!("HTTP {status}: {detail}")),
    }
}

fn error_detail(body: &str) -> String {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    match map.get("detail") {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Null) | None => body.to_string(),
        // Validation errors carry a list of objects.
        Some(other) => other.to_string(),
    }
}

/// Map a [`reqwest::Error`] to a [`ClientError`].
///
/// `timeout` is the limit the request ran under, reported on timeouts.
pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(timeout)
    } else if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Network(Box::new(err))
    }
}

/// Read a response body and decode it as JSON, mapping non-success statuses.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<T, ClientError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;

    if !status.is_success() {
        return Err(map_http_status(status, &text));
    }

    serde_json::from_str(&text).map_err(|e| ClientError::Decode(format!("invalid JSON response: {e}")))
}
