//! Shared kitchen state passed to every component.
//!
//! Lock order: the pool lock is always taken before any worker lock. The
//! admission queue synchronizes itself and is never locked together with
//! either. No lock is held across an `.await`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::KitchenConfig;
use crate::core::admission_queue::AdmissionQueue;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::collaborators::{IngredientCatalog, StateRecorder};
use crate::core::error::{AdmissionError, PersistError};
use crate::core::model::{Order, OrderStatus, Tool, ToolHandle, Worker, WorkerStatus};
use crate::core::planner::WarehousePathPlanner;
use crate::core::registry::{PoolState, WorkerRegistry};
use crate::core::safety::SafetyChecker;
use crate::core::workspace::{Partition, WorkspaceAllocator};
use crate::util::clock::now_ms;
use crate::util::serde::{OrderId, WorkerId};

/// Point-in-time view of the kitchen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitchenStatus {
    /// Every tool.
    pub tools: Vec<Tool>,
    /// Every worker.
    pub workers: Vec<Worker>,
    /// Workspace layout.
    pub partitions: Vec<Partition>,
    /// Workspace units allocated.
    pub workspace_used: u32,
    /// Workspace capacity.
    pub workspace_total: u32,
    /// Orders waiting for admission.
    pub queue_len: usize,
    /// Orders finished so far.
    pub completed: usize,
}

/// Explicit context object owning every shared resource.
pub struct KitchenContext {
    config: KitchenConfig,
    queue: AdmissionQueue,
    pool: Mutex<PoolState>,
    workers: WorkerRegistry,
    safety: SafetyChecker,
    planner: WarehousePathPlanner,
    catalog: Arc<dyn IngredientCatalog>,
    recorder: Option<Arc<dyn StateRecorder>>,
    audit: Option<Arc<dyn AuditSink>>,
    processing: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    completed: Mutex<Vec<Order>>,
}

impl fmt::Debug for KitchenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KitchenContext")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("workers", &self.workers.len())
            .field("recorder", &self.recorder.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl KitchenContext {
    /// Assemble a context. The configuration must already be validated.
    #[must_use]
    pub fn new(
        config: KitchenConfig,
        queue: AdmissionQueue,
        catalog: Arc<dyn IngredientCatalog>,
        recorder: Option<Arc<dyn StateRecorder>>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pool: Mutex::new(PoolState::new(&config.tools, config.workspace_capacity)),
            workers: WorkerRegistry::new(config.worker_count),
            safety: SafetyChecker::new(),
            planner: WarehousePathPlanner::new(config.planner_start),
            processing: Arc::new(Semaphore::new(config.effective_max_in_flight())),
            completed: Mutex::new(Vec::new()),
            config,
            queue,
            catalog,
            recorder,
            audit,
            shutdown,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Admission queue.
    #[must_use]
    pub const fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Worker fleet.
    #[must_use]
    pub const fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// Path planner.
    #[must_use]
    pub const fn planner(&self) -> &WarehousePathPlanner {
        &self.planner
    }

    /// Ingredient catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn IngredientCatalog {
        self.catalog.as_ref()
    }

    /// Bounded processing pool.
    #[must_use]
    pub fn processing(&self) -> Arc<Semaphore> {
        Arc::clone(&self.processing)
    }

    /// Receiver that flips to `true` on shutdown.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Copy of the workspace allocator state.
    #[must_use]
    pub fn workspace(&self) -> WorkspaceAllocator {
        self.pool.lock().workspace.clone()
    }

    /// Copies of every tool.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.pool.lock().tools.tools().to_vec()
    }

    /// Orders that finished cooking, in completion order.
    #[must_use]
    pub fn completed_orders(&self) -> Vec<Order> {
        self.completed.lock().clone()
    }

    /// Run the dry-run safety check against a consistent snapshot.
    #[must_use]
    pub fn check_grant_safe(&self, worker_id: WorkerId, order: &Order) -> bool {
        let pool = self.pool.lock();
        let free_tools = pool.tools.free_tools();
        let workspace = pool.workspace.snapshot();
        let workers = self.workers.snapshot();
        drop(pool);

        let Some(candidate) = workers.iter().find(|w| w.id == worker_id) else {
            return false;
        };
        self.safety
            .is_grant_safe(candidate, order, &free_tools, &workers, &workspace)
    }

    /// Commit workspace, then tools in acquisition order, then the worker
    /// binding. On any failure everything taken in this attempt is given back
    /// before returning.
    ///
    /// Returns a copy of the worker as bound.
    ///
    /// # Errors
    ///
    /// `UnknownWorker`, `WorkerBusy`, `Malformed`, any workspace allocation
    /// error, or `ToolUnavailable` for the first category that ran out.
    pub fn allocate_resources(&self, worker_id: WorkerId, order: &Order) -> Result<Worker, AdmissionError> {
        let mut pool = self.pool.lock();
        let cell = self
            .workers
            .cell(worker_id)
            .ok_or(AdmissionError::UnknownWorker(worker_id))?;
        let mut worker = cell.lock();
        if !worker.is_free() {
            return Err(AdmissionError::WorkerBusy(worker_id));
        }
        let dish = Arc::clone(order.validate()?);

        let compactions = pool.workspace.defragmentations();
        let lease = pool.workspace.allocate(order)?;
        if pool.workspace.defragmentations() != compactions {
            self.refresh_leases(&pool, worker_id);
        }
        let mut held: Vec<ToolHandle> = Vec::with_capacity(dish.tools.len());
        for kind in dish.acquisition_order() {
            if let Some(handle) = pool.tools.acquire(kind, worker_id) {
                held.push(handle);
            } else {
                warn!(order_id = order.id, worker_id, ?kind, "tool exhausted, rolling back");
                Self::roll_back(&mut pool, &mut worker, order.id, &held, true);
                worker.version += 1;
                return Err(AdmissionError::ToolUnavailable(kind));
            }
        }

        let mut bound = order.clone();
        bound.status = OrderStatus::InProgress;
        worker.status = WorkerStatus::Busy;
        worker.current_order = Some(bound);
        worker.held_tools = held;
        worker.workspace = Some(lease);
        worker.version += 1;
        debug!(order_id = order.id, worker_id, version = worker.version, "resources committed");
        Ok(worker.clone())
    }

    /// Compaction moves partitions; re-read every other busy worker's lease.
    /// Called with the pool lock held and `skip`'s worker lock held.
    fn refresh_leases(&self, pool: &PoolState, skip: WorkerId) {
        for &id in self.workers.ids() {
            if id == skip {
                continue;
            }
            let Some(cell) = self.workers.cell(id) else { continue };
            let mut worker = cell.lock();
            if let Some(lease) = worker.workspace {
                debug!(worker_id = id, order_id = lease.order_id, "lease refreshed after compaction");
                worker.workspace = pool.workspace.lease_of(lease.order_id);
            }
        }
    }

    /// Best-effort undo. Every step is attempted even if an earlier one fails.
    fn roll_back(
        pool: &mut PoolState,
        worker: &mut Worker,
        order_id: OrderId,
        tools: &[ToolHandle],
        has_workspace: bool,
    ) {
        for handle in tools {
            if !pool.tools.release(handle.id) {
                error!(order_id, tool_id = handle.id, "rollback could not free tool");
            }
        }
        if has_workspace {
            if let Err(err) = pool.workspace.release(order_id) {
                error!(order_id, error = %err, "rollback could not release workspace");
            }
        }
        worker.clear();
    }

    /// Give back everything `worker_id` holds for `order_id` and free the
    /// worker. Returns the order as it was bound, or `None` if the worker is
    /// not serving that order.
    pub fn release_worker(&self, worker_id: WorkerId, order_id: OrderId) -> Option<(Order, Worker)> {
        let mut pool = self.pool.lock();
        let cell = self.workers.cell(worker_id)?;
        let mut worker = cell.lock();
        if worker.current_order.as_ref().map(|o| o.id) != Some(order_id) {
            warn!(worker_id, order_id, "release for an order the worker is not serving");
            return None;
        }
        let order = worker.current_order.clone()?;
        let tools = worker.held_tools.clone();
        let has_workspace = worker.workspace.is_some();
        Self::roll_back(&mut pool, &mut worker, order_id, &tools, has_workspace);
        worker.version += 1;
        Some((order, worker.clone()))
    }

    /// Release path for a grant whose processing never finished: resources
    /// back to the pools and the order back in the queue as pending. An order
    /// that cannot be requeued because the queue is closed is dropped and
    /// audited as such.
    pub fn requeue_interrupted(&self, worker_id: WorkerId, order_id: OrderId) -> Option<(Order, Worker)> {
        let (mut order, worker) = self.release_worker(worker_id, order_id)?;
        order.status = OrderStatus::Pending;
        match self.queue.requeue(order.clone()) {
            Ok(()) => {
                warn!(order_id, worker_id, "processing interrupted, order requeued");
                self.audit(
                    order_id,
                    Some(worker_id),
                    AuditAction::RolledBack,
                    Some("processing interrupted".into()),
                );
            }
            Err(err) => {
                warn!(order_id, worker_id, error = %err, "processing interrupted, order dropped");
                self.audit(order_id, Some(worker_id), AuditAction::Dropped, Some(err.to_string()));
            }
        }
        Some((order, worker))
    }

    /// Release path after cooking: resources back to the pools, order
    /// completed, audited and added to the ledger.
    pub fn complete_order(&self, worker_id: WorkerId, order_id: OrderId) -> Option<(Order, Worker)> {
        let (mut order, worker) = self.release_worker(worker_id, order_id)?;
        order.status = OrderStatus::Completed;
        order.completed_at_ms = Some(now_ms().max(order.created_at_ms + 1));
        info!(order_id, worker_id, dish = %order.dish_name(), "order completed");
        self.audit(order_id, Some(worker_id), AuditAction::Completed, None);
        self.completed.lock().push(order.clone());
        Some((order, worker))
    }

    /// Report state to the persistence collaborator, bounded by the configured
    /// timeout. Only a version conflict is surfaced; other failures and
    /// timeouts are logged.
    ///
    /// # Errors
    ///
    /// [`PersistError::Conflict`] when the worker record is stale.
    pub async fn persist(&self, worker: &Worker, order: &Order) -> Result<(), PersistError> {
        let Some(recorder) = self.recorder.clone() else {
            return Ok(());
        };
        let write = async {
            recorder.record_worker(worker).await?;
            recorder.record_order(order).await
        };
        match tokio::time::timeout(self.config.persist_timeout(), write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(conflict @ PersistError::Conflict { .. })) => Err(conflict),
            Ok(Err(err)) => {
                warn!(order_id = order.id, worker_id = worker.id, error = %err, "persistence failed");
                Ok(())
            }
            Err(_) => {
                warn!(order_id = order.id, worker_id = worker.id, "persistence timed out");
                Ok(())
            }
        }
    }

    /// Report a grant that was rolled back: the worker as it is now and the
    /// order as pending. Refusals are logged only.
    pub async fn report_rollback(&self, worker_id: WorkerId, order: &Order) {
        let Some(worker) = self.worker(worker_id) else {
            return;
        };
        let mut pending = order.clone();
        pending.status = OrderStatus::Pending;
        if let Err(err) = self.persist(&worker, &pending).await {
            debug!(order_id = order.id, worker_id, error = %err, "rollback not persisted");
        }
    }

    /// Copy of one worker.
    #[must_use]
    pub fn worker(&self, worker_id: WorkerId) -> Option<Worker> {
        self.workers.cell(worker_id).map(|cell| cell.lock().clone())
    }

    /// Record an audit event if a sink is attached.
    pub fn audit(&self, order_id: OrderId, worker_id: Option<WorkerId>, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(order_id, worker_id, action, detail));
        }
    }

    /// Consistent snapshot of tools, workers and workspace.
    #[must_use]
    pub fn status(&self) -> KitchenStatus {
        let pool = self.pool.lock();
        let tools = pool.tools.tools().to_vec();
        let workspace = pool.workspace.snapshot();
        let workers = self.workers.snapshot();
        drop(pool);
        KitchenStatus {
            tools,
            workers,
            workspace_used: workspace.used,
            workspace_total: workspace.total,
            partitions: workspace.partitions,
            queue_len: self.queue.len(),
            completed: self.completed.lock().len(),
        }
    }

    /// Stop admitting, close the queue and wait for in-flight processing to
    /// drain.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        info!("kitchen shutting down");
        self.queue.close();
        let permits = u32::try_from(self.config.effective_max_in_flight()).unwrap_or(u32::MAX);
        match self.processing.acquire_many(permits).await {
            Ok(all) => {
                all.forget();
                self.processing.close();
            }
            Err(err) => warn!(error = %err, "processing pool already closed"),
        }
        info!("kitchen drained");
    }
}
