//! In-memory versioned state store.
//!
//! Worker records are written with optimistic concurrency: a write whose
//! version is not strictly newer than the stored one is refused.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Order, PersistError, StateRecorder, Worker, WorkerStatus};
use crate::util::serde::{OrderId, WorkerId};

/// Persisted view of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredWorker {
    /// Worker identifier.
    pub id: WorkerId,
    /// Status at write time.
    pub status: WorkerStatus,
    /// Order bound at write time.
    pub order_id: Option<OrderId>,
    /// Version written.
    pub version: u64,
}

/// Map-backed [`StateRecorder`] for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    workers: Mutex<HashMap<WorkerId, StoredWorker>>,
    orders: Mutex<HashMap<OrderId, Order>>,
}

impl InMemoryStateStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored worker record.
    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Option<StoredWorker> {
        self.workers.lock().get(&id).cloned()
    }

    /// Stored order record.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.lock().get(&id).cloned()
    }

    /// Force a worker's stored version, as another writer would.
    pub fn bump_worker_version(&self, id: WorkerId, version: u64) {
        let mut workers = self.workers.lock();
        let record = workers.entry(id).or_insert_with(|| StoredWorker {
            id,
            status: WorkerStatus::Free,
            order_id: None,
            version: 0,
        });
        record.version = version;
    }
}

#[async_trait]
impl StateRecorder for InMemoryStateStore {
    async fn record_worker(&self, worker: &Worker) -> Result<(), PersistError> {
        let mut workers = self.workers.lock();
        if let Some(stored) = workers.get(&worker.id) {
            if stored.version >= worker.version {
                return Err(PersistError::Conflict {
                    stored: stored.version,
                    attempted: worker.version,
                });
            }
        }
        debug!(worker_id = worker.id, version = worker.version, "worker persisted");
        workers.insert(
            worker.id,
            StoredWorker {
                id: worker.id,
                status: worker.status,
                order_id: worker.current_order.as_ref().map(|o| o.id),
                version: worker.version,
            },
        );
        Ok(())
    }

    async fn record_order(&self, order: &Order) -> Result<(), PersistError> {
        self.orders.lock().insert(order.id, order.clone());
        Ok(())
    }
}
