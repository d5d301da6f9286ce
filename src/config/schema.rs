//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment environment, reported by the health check.
    pub environment: Environment,

    /// Per-client admission control.
    pub rate_limit: RateLimitConfig,

    /// Drain and signal handling.
    pub shutdown: ShutdownConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Background notification delivery.
    pub notifications: NotificationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "unknown environment '{}' (expected development|staging|production)",
                other
            )),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. When false the registry runs in bypass mode.
    pub enabled: bool,

    /// Token refill rate per client, in tokens per second.
    pub requests_per_second: f64,

    /// Bucket capacity (maximum burst).
    pub burst: u32,

    /// Clients not seen for longer than this are evicted by the sweep.
    pub idle_threshold_secs: u64,

    /// Period of the eviction sweep.
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst: 4,
            idle_threshold_secs: 180,
            sweep_interval_secs: 60,
        }
    }
}

/// What a second interrupt does while the server is already draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondSignalPolicy {
    /// Log and keep draining.
    Ignore,
    /// Abandon the drain and stop with a forced outcome.
    Force,
}

/// Whether background tasks may still be registered once draining began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LateTaskPolicy {
    /// Accept and wait for them within the remaining drain budget.
    Accept,
    /// Refuse the registration and report it to the caller.
    Reject,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Aggregate budget for in-flight requests and background tasks to finish.
    pub drain_budget_secs: u64,

    pub second_signal: SecondSignalPolicy,

    pub late_tasks: LateTaskPolicy,
}

impl ShutdownConfig {
    pub fn drain_budget(&self) -> Duration {
        Duration::from_secs(self.drain_budget_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_budget_secs: 30,
            second_signal: SecondSignalPolicy::Force,
            late_tasks: LateTaskPolicy::Reject,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Background notification delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Delivery attempts before giving up.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 4000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
