//! Startup orchestration.
//!
//! Resolves the effective configuration from an optional TOML file plus
//! command-line overrides, then validates the result once. Any failure here
//! is fatal and maps to [`EXIT_STARTUP_FAILURE`].

use std::net::SocketAddr;
use std::path::Path;

use crate::config::loader::{read_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::{Environment, ServerConfig};

/// Exit status when configuration or binding fails.
pub const EXIT_STARTUP_FAILURE: u8 = 1;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub environment: Option<Environment>,
    pub limiter_rps: Option<f64>,
    pub limiter_burst: Option<u32>,
    pub limiter_enabled: Option<bool>,
    pub drain_budget_secs: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{}", port),
            };
        }
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(rps) = self.limiter_rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.rate_limit.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.rate_limit.enabled = enabled;
        }
        if let Some(budget) = self.drain_budget_secs {
            config.shutdown.drain_budget_secs = budget;
        }
    }
}

/// Build the validated configuration the server will run with.
pub fn resolve_config(path: Option<&Path>, overrides: Overrides) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ServerConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
