//! In-memory adapters for the collaborators around the admission core.

pub mod catalog;
pub mod state;

pub use catalog::InMemoryCatalog;
pub use state::{InMemoryStateStore, StoredWorker};
