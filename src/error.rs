use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Raised by the rate limiter once it has been shut down.
/// Callers treat this as an infrastructure fault and let the request through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    #[error("rate limiter destroyed")]
    Destroyed,
}

/// Errors from the request client. Clone so a single failure can be
/// handed to every caller sharing a deduplicated request.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid JSON body: {0}")]
    Decode(String),

    #[error("shared request for {0} was dropped before it settled")]
    Abandoned(String),

    #[error("batch processor is not running")]
    Closed,
}

impl FetchError {
    /// HTTP status carried by the error, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Handler-level errors. The body only ever carries the sanitized message.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("chat is not available right now")]
    Unavailable,

    #[error("upstream request failed")]
    Upstream(#[source] FetchError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Upstream(source) = &self {
            tracing::error!(error = %source, "upstream call failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
