//! Tokio runtime adapter, the in-process API surface and the order producer.

pub mod api;
pub mod generator;
pub mod tokio_spawner;

pub use api::{health, snapshot_status, submit, submit_batch, BatchReceipt, Health};
pub use generator::OrderGenerator;
pub use tokio_spawner::{KitchenRuntime, TokioSpawner};
