//! Shared reqwest plumbing: client construction, auth, error mapping.

use std::time::Duration;

use parley_core::CollaboratorError;

use crate::config::RemoteEndpoint;

/// Longest upstream error body carried into an error message.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
) -> Result<reqwest::Client, CollaboratorError> {
    let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| CollaboratorError::Other(format!("failed to create HTTP client: {e}")))
}

/// POST to `path` on `endpoint`, with bearer auth when a key is configured.
pub(crate) fn post(
    client: &reqwest::Client,
    endpoint: &RemoteEndpoint,
    path: &str,
) -> reqwest::RequestBuilder {
    let request = client.post(endpoint.url(path));
    match endpoint.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}

pub(crate) fn transport_error(e: &reqwest::Error) -> CollaboratorError {
    if e.is_connect() {
        CollaboratorError::Unavailable(e.to_string())
    } else {
        CollaboratorError::Transport(e.to_string())
    }
}

/// Send `request` and turn non-success statuses into
/// [`CollaboratorError::Upstream`].
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, CollaboratorError> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    tracing::debug!(status = status.as_u16(), body = %message, "Upstream returned an error");
    Err(CollaboratorError::Upstream {
        status: status.as_u16(),
        message,
    })
}
