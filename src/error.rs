use axum::{http::StatusCode, Json};
use thiserror::Error;

/// Errors surfaced by the aggregation core.
///
/// Per-item failures (one feed, one channel) never show up here; they are
/// recorded in run summaries instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("a check run is already in progress")]
    CheckAlreadyRunning,

    #[error("a playlist update is already in progress")]
    PipelineAlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("subscription already exists: {0}")]
    SubscriptionExists(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::CheckAlreadyRunning
            | CoreError::PipelineAlreadyRunning
            | CoreError::SubscriptionExists(_) => StatusCode::CONFLICT,
            CoreError::InvalidConfig(_) | CoreError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            CoreError::SubscriptionNotFound(_) | CoreError::ChannelNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for (StatusCode, Json<serde_json::Value>) {
    fn from(err: CoreError) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", err);
        }
        (status, Json(serde_json::json!({ "error": err.to_string() })))
    }
}

/// Failure to retrieve one subscription body
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("playlist too large: {size_mb:.1}MB (limit {limit_mb}MB)")]
    TooLarge { size_mb: f64, limit_mb: usize },

    #[error("response is not an M3U playlist")]
    NotPlaylist,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("error").to_string(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CoreError::CheckAlreadyRunning.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CoreError::InvalidConfig("concurrency".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::ChannelNotFound("http://x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::from(anyhow::anyhow!("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::TooLarge { size_mb: 12.34, limit_mb: 10 };
        assert_eq!(err.to_string(), "playlist too large: 12.3MB (limit 10MB)");
    }
}
