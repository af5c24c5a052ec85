use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frame_sampler::Error;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`frame_sampler::Error`] for domain errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sampler(#[from] Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Sampler(err) => match err {
                Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                Error::Mismatch { .. } => (StatusCode::CONFLICT, "MISMATCH", err.to_string()),
                Error::Busy(_) => (StatusCode::CONFLICT, "BUSY", err.to_string()),
                Error::NotPreprocessed { .. } => {
                    (StatusCode::CONFLICT, "NOT_PREPROCESSED", err.to_string())
                }
                Error::InvalidFrameIndex(_) | Error::InvalidContent => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string())
                }
                Error::Probe(_) | Error::Extraction(_) => {
                    tracing::warn!(error = %err, "Transcoder error");
                    (StatusCode::BAD_GATEWAY, "TRANSCODER_ERROR", err.to_string())
                }
                Error::Write { .. } | Error::Filesystem { .. } | Error::Store(_) => {
                    tracing::error!(error = %err, "Internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
