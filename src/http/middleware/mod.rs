//! Request gates applied ahead of the handlers.

pub mod admission;
pub mod drain;

pub use admission::{admission_gate, client_identity};
pub use drain::reject_when_draining;
