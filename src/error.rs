use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single client fetch cycle. Never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend answered {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors surfaced by the proxy's HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid coordinate {name}: {value:?}")]
    InvalidCoordinate { name: &'static str, value: String },
    #[error("coordinates out of range")]
    OutOfRange,
    #[error("search query must be 1 to {max} characters")]
    InvalidQuery { max: usize },
    #[error("upstream query failed: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCoordinate { .. }
            | ApiError::OutOfRange
            | ApiError::InvalidQuery { .. } => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
