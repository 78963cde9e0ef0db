//! Provider error types.

use thiserror::Error;

/// Errors that can occur when calling a classifier backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    NetworkError(String),

    /// The response parsed but carried no text.
    #[error("empty reply from {0}")]
    EmptyReply(String),

    /// No backend is configured.
    #[error("no classifier provider configured")]
    NotConfigured,
}

impl ProviderError {
    /// Map a transport failure, distinguishing timeouts.
    pub(crate) fn from_transport(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

/// Turn a non-success response into the matching [`ProviderError`].
///
/// `extract_message` pulls a human-readable message out of an error body.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
    extract_message: fn(&str) -> Option<String>,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        401 => Err(ProviderError::AuthenticationFailed(body)),
        404 => Err(ProviderError::ModelNotFound(model.to_string())),
        _ => Err(ProviderError::ApiError {
            status,
            message: extract_message(&body).unwrap_or(body),
        }),
    }
}
