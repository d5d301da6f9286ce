pub mod concurrency;
pub mod movie;
pub mod patch;
pub mod store;

pub use concurrency::{OptimisticGuard, WriteError};
pub use movie::{FieldErrors, Movie, MovieInput, MovieUpdate, Runtime};
pub use patch::Patch;
pub use store::{MemoryStore, StoreError, Versioned, VersionedStore};
