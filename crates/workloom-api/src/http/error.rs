//! Application error type mapping to HTTP status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use workloom_core::workflow::handle::HandleError;
use workloom_types::error::WorkflowError;

/// Application-level error that maps to HTTP responses.
///
/// Error bodies are a flat `{"error": "..."}` object, matching what the
/// upload frontend expects.
#[derive(Debug)]
pub enum ApiError {
    /// Request was malformed (bad multipart, wrong content type).
    Validation(String),
    /// The requested workflow instance does not exist.
    NotFound(String),
    /// Anything else.
    Internal(String),
}

impl From<HandleError> for ApiError {
    fn from(e: HandleError) -> Self {
        match e {
            HandleError::Workflow(WorkflowError::InstanceNotFound(id)) => {
                ApiError::NotFound(format!("workflow {id} not found"))
            }
            HandleError::Workflow(WorkflowError::UnknownWorkflow(name)) => {
                ApiError::NotFound(format!("unknown workflow '{name}'"))
            }
            HandleError::Workflow(WorkflowError::NameMismatch { id, .. }) => {
                ApiError::NotFound(format!("workflow {id} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = msg.as_str(), "internal API error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
