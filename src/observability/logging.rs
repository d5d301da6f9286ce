//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level so operators can turn up a
//! single module without editing the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global tracing subscriber.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("marquee_api={level},tower_http={level}"))
}
