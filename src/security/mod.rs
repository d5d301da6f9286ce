//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket)
//!     → Pass to handlers, or 429 with Retry-After
//!
//! Background:
//!     → sweeper evicts clients idle past the threshold
//! ```
//!
//! # Design Decisions
//! - One lock covers lookup, insert, consume and eviction
//! - Refill is computed on access; no per-client timers
//! - Idle clients are forgotten, so a returning client starts with a full bucket

pub mod rate_limit;

pub use rate_limit::{LimiterRegistry, TokenBucket, Verdict};
