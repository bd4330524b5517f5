//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger_store::LedgerStoreError;
use pipeline::PipelineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Pipeline error.
    Pipeline(PipelineError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Pipeline(err) => pipeline_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn pipeline_error_to_response(err: PipelineError) -> (StatusCode, String) {
    match &err {
        PipelineError::FundNotFound(_)
        | PipelineError::SecurityNotFound(_)
        | PipelineError::SubTypeNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        PipelineError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        PipelineError::Store(LedgerStoreError::TransitionConflict { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "pipeline error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<LedgerStoreError> for ApiError {
    fn from(err: LedgerStoreError) -> Self {
        ApiError::Pipeline(PipelineError::Store(err))
    }
}
