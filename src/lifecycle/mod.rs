//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Apply overrides → Validate → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests + tasks → Exit
//!
//! Tasks (tasks.rs):
//!     Handler registers → spawns deferred work → guard drop releases
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second signal → ignored or forced, per policy
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has one aggregate budget: forced exit after the deadline
//! - Exit status tells the operator whether deferred work was cut short

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod tasks;

pub use shutdown::{DrainOutcome, ShutdownCoordinator, ShutdownState};
pub use tasks::{IdleOutcome, TaskGuard, TaskRejected, TaskTracker};
