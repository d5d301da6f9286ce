//! Per-client admission control.
//! Consumes one token from the caller's bucket or answers 429.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::security::rate_limit::{clock_now, LimiterRegistry, Verdict};

/// Identity used when the peer address is unknown.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Client identity for admission: the peer IP.
pub fn client_identity<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub async fn admission_gate(
    State(limiter): State<Arc<LimiterRegistry>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = client_identity(&request);
    match limiter.allow(&client, clock_now()) {
        Verdict::Allowed => next.run(request).await,
        Verdict::Denied { retry_after } => {
            metrics::record_rate_limited();
            tracing::warn!(
                client = %client,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            ApiError::RateLimitExceeded { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::Request, http::StatusCode, middleware, routing::get, Router};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(limiter: Arc<LimiterRegistry>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, admission_gate))
    }

    fn from(addr: &str) -> Request<Body> {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = addr.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn identity_is_peer_ip() {
        assert_eq!(client_identity(&from("10.0.0.7:51234")), "10.0.0.7");
        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identity(&bare), UNKNOWN_CLIENT);
    }

    #[tokio::test]
    async fn clients_have_independent_buckets() {
        let limiter = Arc::new(LimiterRegistry::new(
            1,
            0.5,
            Duration::from_secs(180),
            Duration::from_secs(60),
        ));
        let app = app(limiter.clone());

        let first = app.clone().oneshot(from("10.0.0.1:1000")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        // Same IP, different port: same client.
        let second = app.clone().oneshot(from("10.0.0.1:2000")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["retry-after"], "2");

        let other = app.oneshot(from("10.0.0.2:1000")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test]
    async fn vanishing_refill_rate_still_denies_with_429() {
        let mut config = crate::config::ServerConfig::default();
        config.rate_limit.requests_per_second = 1e-20;
        assert!(crate::config::validation::validate_config(&config).is_ok());

        let limiter = Arc::new(LimiterRegistry::from_config(&config.rate_limit));
        let app = app(limiter);
        for _ in 0..config.rate_limit.burst {
            let response = app.clone().oneshot(from("10.0.0.1:1000")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(from("10.0.0.1:1000")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 1_000_000);
    }

    #[tokio::test]
    async fn disabled_registry_admits_everything() {
        let limiter = Arc::new(LimiterRegistry::disabled());
        let app = app(limiter.clone());
        for _ in 0..20 {
            let response = app.clone().oneshot(from("10.0.0.1:1000")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(limiter.is_empty());
    }
}
