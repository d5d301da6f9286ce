//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + command-line overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed by value to the subsystems that need a section
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    Environment, LateTaskPolicy, ListenerConfig, NotificationConfig, ObservabilityConfig,
    RateLimitConfig, SecondSignalPolicy, ServerConfig, ShutdownConfig, TimeoutConfig,
};
