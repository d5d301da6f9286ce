//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, version header)
//!     → middleware/ (drain gate, admission)
//!     → handlers.rs (movie routes)
//!     → response.rs (ApiError → status + JSON envelope)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{X_EXPECTED_VERSION, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{ApiServer, AppState};
