//! Persistence backends for worker and order state.

pub mod memory;

pub use memory::{InMemoryStateStore, StoredWorker};
