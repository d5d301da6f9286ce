//! Per-request fault containment.
//!
//! A panic inside a handler is caught at the request boundary, logged with
//! the request context, and turned into a generic 500. The connection is
//! marked `Connection: close` because the handler's state at the point of
//! the panic is unknown. The faulted handler is never resumed.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{body::Body, extract::Request, middleware::Next, response::IntoResponse, response::Response};
use futures_util::FutureExt;

use crate::http::request::request_id;
use crate::http::response::ApiError;
use crate::observability::metrics;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Outermost application middleware.
pub async fn contain_faults(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let id = request_id(request.headers()).unwrap_or("unknown").to_owned();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            metrics::record_handler_fault();
            tracing::error!(
                request_id = %id,
                method = %method,
                path = %path,
                panic = %panic_message(payload.as_ref()),
                "Handler panicked; closing connection"
            );
            ApiError::HandlerFault.into_response()
        }
    }
}
