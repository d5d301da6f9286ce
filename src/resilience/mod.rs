//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Every request:
//!     → containment.rs (catch handler panics, 500 + Connection: close)
//!
//! Background delivery:
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - A fault is contained to the request that caused it; the process keeps serving
//! - Fault detail goes to the log, never to the client
//! - Jittered backoff prevents retry bursts from lining up

pub mod backoff;
pub mod containment;
