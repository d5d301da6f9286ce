//! Configuration validation.
//!
//! Serde handles the syntactic side; this module checks value ranges and
//! returns every violation, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let limiter = &config.rate_limit;
    if !limiter.requests_per_second.is_finite() || limiter.requests_per_second <= 0.0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            "must be a positive number",
        ));
    }
    if limiter.burst == 0 {
        errors.push(ValidationError::new("rate_limit.burst", "must be at least 1"));
    }
    if limiter.idle_threshold_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.idle_threshold_secs",
            "must be at least 1",
        ));
    }
    if limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be at least 1",
        ));
    }

    if config.shutdown.drain_budget_secs == 0 {
        errors.push(ValidationError::new(
            "shutdown.drain_budget_secs",
            "must be at least 1",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be at least 1"));
    }

    let notifications = &config.notifications;
    if notifications.max_attempts == 0 {
        errors.push(ValidationError::new(
            "notifications.max_attempts",
            "must be at least 1",
        ));
    }
    if notifications.base_delay_ms > notifications.max_delay_ms {
        errors.push(ValidationError::new(
            "notifications.base_delay_ms",
            "must not exceed notifications.max_delay_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
