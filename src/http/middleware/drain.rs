//! Refuses requests that arrive after the drain has begun.
//!
//! The listener stops accepting at the start of the drain, but a kept-alive
//! connection can still deliver a request. Those get 503 and
//! `Connection: close` without reaching admission or a handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::request_id;
use crate::http::response::ApiError;
use crate::lifecycle::ShutdownCoordinator;
use crate::observability::metrics;

pub async fn reject_when_draining(
    State(coordinator): State<Arc<ShutdownCoordinator>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if coordinator.is_running() {
        return next.run(request).await;
    }

    metrics::record_rejected_draining();
    tracing::debug!(
        request_id = request_id(request.headers()).unwrap_or("unknown"),
        path = %request.uri().path(),
        "Rejected request: draining"
    );
    ApiError::Unavailable.into_response()
}
