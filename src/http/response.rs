//! Client-facing error responses.
//!
//! Every failure a handler or middleware can surface collapses into
//! [`ApiError`], rendered as `{"error": ...}` with the matching status code.
//! Server-side faults return a generic message; the detail stays in the log.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::data::concurrency::WriteError;
pub use crate::data::movie::FieldErrors;
use crate::lifecycle::tasks::TaskRejected;

const SERVER_FAULT_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("the requested resource could not be found")]
    RecordNotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("the server is shutting down")]
    Unavailable,

    /// A handler panicked; produced only by fault containment.
    #[error("handler fault")]
    HandlerFault,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RecordNotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::HandlerFault | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Whole seconds for `Retry-After`, rounded up, at least 1.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs().saturating_add(u64::from(wait.subsec_nanos() > 0));
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::Validation(errors) => json!({ "error": errors }),
            ApiError::HandlerFault => json!({ "error": SERVER_FAULT_MESSAGE }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                json!({ "error": SERVER_FAULT_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match self {
            ApiError::RateLimitExceeded { retry_after } => {
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs(retry_after)),
                );
            }
            ApiError::HandlerFault | ApiError::Unavailable => {
                headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }

        response
    }
}

impl From<WriteError> for ApiError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::EditConflict { .. } => ApiError::EditConflict,
            WriteError::NotFound(_) => ApiError::RecordNotFound,
            WriteError::Storage(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<TaskRejected> for ApiError {
    fn from(_: TaskRejected) -> Self {
        ApiError::Unavailable
    }
}
