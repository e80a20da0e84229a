use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use volt_core::{ParseError, ValidationError};
use volt_memory::MemoryError;

/// Handler failures and the HTTP envelope each one is reported in.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Store(String),

    #[error("not found")]
    NotFound,

    /// Uploaded text that is neither JSON nor NDJSON.
    #[error("{0}")]
    Parse(String),
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Validation(msg) => ApiError::BadRequest(msg),
            MemoryError::Store(msg) => ApiError::Store(msg),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.0)
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        ApiError::Parse(err.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => {
                tracing::warn!("bad request: {message}");
                (
                    StatusCode::BAD_REQUEST,
                    json!({"status": "error", "message": message}),
                )
            }
            ApiError::Store(message) => {
                tracing::error!("store error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"status": "error", "message": message}),
                )
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({"ok": false, "error": "not_found"}),
            ),
            ApiError::Parse(message) => {
                tracing::warn!("parse error: {message}");
                (
                    StatusCode::BAD_REQUEST,
                    json!({"ok": false, "error": "parse_error", "message": message}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Decode a JSON request body; an empty body reads as `{}`.
pub(crate) fn parse_json_body<T>(body: &str) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned,
{
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}
