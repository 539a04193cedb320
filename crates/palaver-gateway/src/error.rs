//! HTTP error mapping for gateway handlers

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use palaver_context::ContextError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Metrics unavailable: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Context(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response()
            }
            Self::Context(ContextError::Provider { kind, source }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "response": kind.user_message(),
                    "error": source.to_string(),
                })),
            )
                .into_response(),
            Self::Context(err) => {
                tracing::error!(error = %err, "conversation operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
            Self::Metrics(err) => {
                tracing::error!(error = %err, "failed to render metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}
