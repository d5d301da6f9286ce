//! marquee-api server binary.
//!
//! ```text
//!     Client Request
//!     ──▶ request id ──▶ trace ──▶ timeout ──▶ fault containment
//!         ──▶ drain gate ──▶ admission (token bucket) ──▶ handler
//!                                                      │
//!                     optimistic guard ◀───────────────┤
//!                     (versioned store)                │
//!                                                      ▼
//!                                           task tracker ──▶ notifier
//!
//!     SIGINT / SIGTERM ──▶ shutdown coordinator
//!         stop accepting ──▶ drain requests + tasks (one budget) ──▶ exit
//! ```
//!
//! Exit status: 0 after a clean drain, 1 on startup failure, 2 when the
//! drain budget ran out or a second signal forced the exit.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use marquee_api::config::{Environment, ObservabilityConfig};
use marquee_api::lifecycle::signals::spawn_signal_listener;
use marquee_api::lifecycle::startup::{resolve_config, Overrides, EXIT_STARTUP_FAILURE};
use marquee_api::observability::{logging, metrics};
use marquee_api::ApiServer;

#[derive(Debug, Parser)]
#[command(name = "marquee-api", version, about = "JSON movie API server")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// API server port.
    #[arg(long)]
    port: Option<u16>,

    /// Environment (development|staging|production).
    #[arg(long = "env")]
    environment: Option<Environment>,

    /// Rate limiter maximum requests per second.
    #[arg(long)]
    limiter_rps: Option<f64>,

    /// Rate limiter maximum burst.
    #[arg(long)]
    limiter_burst: Option<u32>,

    /// Enable rate limiter.
    #[arg(long)]
    limiter_enabled: Option<bool>,

    /// Seconds allowed for in-flight requests and background tasks to finish.
    #[arg(long)]
    drain_budget_secs: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            environment: self.environment,
            limiter_rps: self.limiter_rps,
            limiter_burst: self.limiter_burst,
            limiter_enabled: self.limiter_enabled,
            drain_budget_secs: self.drain_budget_secs,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(cli.config.as_deref(), cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    logging::init(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        bind_address = %config.listener.bind_address,
        rate_limit = config.rate_limit.enabled,
        drain_budget_secs = config.shutdown.drain_budget_secs,
        "marquee-api starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                    return ExitCode::from(EXIT_STARTUP_FAILURE);
                }
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
                return ExitCode::from(EXIT_STARTUP_FAILURE);
            }
        }
    }

    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                bind_address = %config.listener.bind_address,
                error = %e,
                "Failed to bind listener"
            );
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let server = ApiServer::new(config);
    spawn_signal_listener(server.coordinator());

    match server.run(listener).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}
