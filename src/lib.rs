//! Concurrency and resilience layer for a JSON movie API.
//!
//! Per-client admission control, optimistic versioning for concurrent
//! writes, tracked background work, fault containment, and a graceful
//! drain on shutdown.

pub mod config;
pub mod data;
pub mod http;
pub mod lifecycle;
pub mod notify;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ServerConfig;
pub use http::ApiServer;
pub use lifecycle::{DrainOutcome, ShutdownCoordinator};
