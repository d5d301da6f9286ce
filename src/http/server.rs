//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the Axum router with the movie routes
//! - Wire up middleware (request ID, tracing, timeout, fault containment,
//!   drain gate, admission)
//! - Serve on a listener until the shutdown coordinator starts the drain
//! - Run the drain and report how it ended

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::data::{MemoryStore, Movie, OptimisticGuard};
use crate::http::handlers;
use crate::http::middleware::{admission_gate, reject_when_draining};
use crate::http::request::{request_id, RequestUuid};
use crate::lifecycle::{DrainOutcome, ShutdownCoordinator, TaskTracker};
use crate::notify::{LogNotifier, Notifier};
use crate::resilience::containment::contain_faults;
use crate::security::rate_limit::{spawn_sweeper, LimiterRegistry};

pub type MovieStore = MemoryStore<Movie>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub movies: OptimisticGuard<MovieStore>,
    pub tasks: TaskTracker,
    pub notifier: Arc<dyn Notifier>,
}

/// The API server: router, limiter and shutdown coordinator.
pub struct ApiServer {
    config: Arc<ServerConfig>,
    router: Router,
    coordinator: Arc<ShutdownCoordinator>,
    limiter: Arc<LimiterRegistry>,
}

impl ApiServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: ServerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config);
        let coordinator = Arc::new(ShutdownCoordinator::new(&config.shutdown));
        let limiter = Arc::new(LimiterRegistry::from_config(&config.rate_limit));

        let state = AppState {
            config: Arc::clone(&config),
            movies: OptimisticGuard::new(Arc::new(MovieStore::new())),
            tasks: coordinator.tasks().clone(),
            notifier,
        };

        let router = build_router(&config, state, &coordinator, &limiter);
        Self {
            config,
            router,
            coordinator,
            limiter,
        }
    }

    /// The fully layered router, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn limiter(&self) -> Arc<LimiterRegistry> {
        Arc::clone(&self.limiter)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until the drain begins, then drain.
    ///
    /// Returns how the drain ended; `Err` only if the listener failed.
    pub async fn run(self, listener: TcpListener) -> io::Result<DrainOutcome> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = self.config.environment.as_str(),
            rate_limit = self.limiter.is_enabled(),
            "API server starting"
        );

        let drain_token = self.coordinator.drain_token();
        let _sweeper = spawn_sweeper(Arc::clone(&self.limiter), drain_token.clone());

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(drain_token.cancelled_owned())
                .await
        });

        let stopped_early = tokio::select! {
            _ = self.coordinator.draining() => None,
            joined = &mut server => Some(joined),
        };

        if let Some(joined) = stopped_early {
            self.coordinator.begin_drain();
            let served = joined.map_err(io::Error::other)?;
            if let Err(e) = served {
                tracing::error!(error = %e, "Listener failed");
                return Err(e);
            }
            return Ok(self.coordinator.drain(async {}).await);
        }

        let outcome = self
            .coordinator
            .drain(async {
                // A failed serve task never counts as drained.
                if !serve_finished_cleanly((&mut server).await) {
                    std::future::pending::<()>().await;
                }
            })
            .await;
        server.abort();

        tracing::info!(exit_code = outcome.exit_code(), "API server stopped");
        Ok(outcome)
    }
}

/// Log how the serve task ended; `true` only when it closed normally.
fn serve_finished_cleanly(joined: Result<io::Result<()>, JoinError>) -> bool {
    match joined {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Listener failed while draining");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Serve task ended abnormally while draining");
            false
        }
    }
}

/// Build the Axum router with all middleware layers.
///
/// Layers run outermost first: request id, trace, timeout, fault
/// containment, drain gate, admission, handler.
#[allow(deprecated)]
pub fn build_router(
    config: &ServerConfig,
    state: AppState,
    coordinator: &Arc<ShutdownCoordinator>,
    limiter: &Arc<LimiterRegistry>,
) -> Router {
    Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route("/v1/movies", axum::routing::post(handlers::create_movie))
        .route(
            "/v1/movies/{id}",
            get(handlers::show_movie).patch(handlers::update_movie),
        )
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            Arc::clone(limiter),
            admission_gate,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(coordinator),
            reject_when_draining,
        ))
        .layer(middleware::from_fn(contain_faults))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.timeouts.request_secs,
        )))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = request_id(request.headers()).unwrap_or("unknown"),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(RequestUuid))
}
