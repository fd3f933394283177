//! The admission loop.
//!
//! One logical loop pulls orders from the queue and runs them through the
//! admission gate: free worker, dry-run safety check, retrieval planning and
//! a processing slot. Passing orders get real resources and a processing
//! task; failing ones go back into the queue and the loop backs off.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::core::audit::AuditAction;
use crate::core::collaborators::Spawn;
use crate::core::context::KitchenContext;
use crate::core::error::{AdmissionError, PersistError};
use crate::core::model::{Order, OrderStatus, Worker};
use crate::util::serde::{OrderId, WorkerId};

/// Result of one pass through the admission gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Resources committed and processing started.
    Granted {
        /// Worker serving the order.
        worker_id: WorkerId,
    },
    /// Requeued; the loop should back off.
    Deferred(AdmissionError),
    /// Malformed; discarded for good.
    Dropped(AdmissionError),
}

/// Releases a granted order's resources exactly once.
///
/// [`CompletionGuard::complete`] runs the normal release path. A guard dropped
/// without completing (task aborted, runtime torn down, panic) still frees the
/// worker, its tools and its workspace, and puts the order back in the queue.
#[derive(Debug)]
pub struct CompletionGuard {
    ctx: Arc<KitchenContext>,
    worker_id: WorkerId,
    order_id: OrderId,
    armed: bool,
}

impl CompletionGuard {
    /// Guard the grant of `order_id` to `worker_id`.
    #[must_use]
    pub const fn new(ctx: Arc<KitchenContext>, worker_id: WorkerId, order_id: OrderId) -> Self {
        Self {
            ctx,
            worker_id,
            order_id,
            armed: true,
        }
    }

    /// Finish the order and release everything it held.
    pub fn complete(mut self) -> Option<(Order, Worker)> {
        self.armed = false;
        self.ctx.complete_order(self.worker_id, self.order_id)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some((order, worker)) = self.ctx.requeue_interrupted(self.worker_id, self.order_id) else {
            return;
        };
        // Persistence is async; report through whatever runtime is still around.
        if let Ok(handle) = Handle::try_current() {
            let ctx = Arc::clone(&self.ctx);
            handle.spawn(async move {
                if let Err(err) = ctx.persist(&worker, &order).await {
                    warn!(order_id = order.id, worker_id = worker.id, error = %err, "interrupted release not persisted");
                }
            });
        }
    }
}

/// Drives admission for one kitchen.
#[derive(Debug)]
pub struct ResourceCoordinator<S> {
    ctx: Arc<KitchenContext>,
    spawner: S,
}

impl<S: Clone> Clone for ResourceCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            spawner: self.spawner.clone(),
        }
    }
}

impl<S> ResourceCoordinator<S>
where
    S: Spawn + Clone,
{
    /// Coordinator over `ctx`, spawning processing tasks through `spawner`.
    pub const fn new(ctx: Arc<KitchenContext>, spawner: S) -> Self {
        Self { ctx, spawner }
    }

    /// Shared context.
    #[must_use]
    pub const fn context(&self) -> &Arc<KitchenContext> {
        &self.ctx
    }

    /// Run the loop on the spawner.
    pub fn start(&self) {
        let this = self.clone();
        self.spawner.spawn(this.run());
    }

    /// Run until shutdown is requested or the queue is closed and drained.
    pub async fn run(self) {
        let mut shutdown = self.ctx.shutdown_signal();
        info!(workers = self.ctx.workers().len(), "coordinator started");
        loop {
            let next = tokio::select! {
                biased;
                () = stop_requested(&mut shutdown) => None,
                next = self.ctx.queue().dequeue() => next,
            };
            let Some(order) = next else { break };

            let backoff = match AssertUnwindSafe(self.admit(order)).catch_unwind().await {
                Ok(Admission::Deferred(_)) => true,
                Ok(Admission::Granted { .. } | Admission::Dropped(_)) => false,
                Err(_) => {
                    error!("admission iteration panicked; continuing");
                    true
                }
            };
            if backoff && self.back_off(&mut shutdown).await {
                break;
            }
        }
        info!("coordinator stopped");
    }

    /// Sleep for the backoff interval. Returns `true` if shutdown interrupted it.
    async fn back_off(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.ctx.config().backoff()) => false,
            () = stop_requested(shutdown) => true,
        }
    }

    /// Run one order through the admission gate.
    pub async fn admit(&self, order: Order) -> Admission {
        let order_id = order.id;
        let dish = match order.validate() {
            Ok(dish) => Arc::clone(dish),
            Err(err) => {
                warn!(order_id, error = %err, "dropping malformed order");
                self.ctx.audit(order_id, None, AuditAction::Dropped, Some(err.to_string()));
                return Admission::Dropped(err);
            }
        };

        let Some(worker_id) = self.ctx.workers().find_free() else {
            return self.defer(order, None, AdmissionError::NoFreeWorker);
        };
        if !self.ctx.check_grant_safe(worker_id, &order) {
            return self.defer(order, Some(worker_id), AdmissionError::UnsafeGrant(order_id));
        }
        let plans = match self.ctx.planner().plan_for_dish(&dish, self.ctx.catalog()) {
            Ok(plans) => plans,
            Err(err) => return self.defer(order, Some(worker_id), err),
        };
        let Ok(permit) = self.ctx.processing().try_acquire_owned() else {
            return self.defer(order, Some(worker_id), AdmissionError::NoProcessingSlot);
        };

        let worker = match self.ctx.allocate_resources(worker_id, &order) {
            Ok(worker) => worker,
            Err(err) => {
                if matches!(err, AdmissionError::ToolUnavailable(_)) {
                    self.ctx
                        .audit(order_id, Some(worker_id), AuditAction::RolledBack, Some(err.to_string()));
                    self.ctx.report_rollback(worker_id, &order).await;
                }
                return self.defer(order, Some(worker_id), err);
            }
        };

        let bound = worker.current_order.clone().unwrap_or_else(|| order.clone());
        if let Err(PersistError::Conflict { stored, attempted }) = self.ctx.persist(&worker, &bound).await {
            warn!(order_id, worker_id, stored, attempted, "persisted state conflicts, undoing grant");
            self.ctx.release_worker(worker_id, order_id);
            self.ctx
                .audit(order_id, Some(worker_id), AuditAction::RolledBack, Some("version conflict".into()));
            self.ctx.report_rollback(worker_id, &order).await;
            let err = AdmissionError::Conflict {
                worker_id,
                stored,
                attempted,
            };
            return self.defer(order, Some(worker_id), err);
        }

        if let Some(best) = plans.best() {
            debug!(order_id, policy = %best.policy, cost = best.total_cost, "retrieval path chosen");
        }
        info!(order_id, worker_id, dish = %dish.name, "order granted");
        self.ctx.audit(order_id, Some(worker_id), AuditAction::Granted, None);
        self.spawn_processing(worker_id, order_id, dish.cook_time(), permit);
        Admission::Granted { worker_id }
    }

    fn defer(&self, mut order: Order, worker_id: Option<WorkerId>, reason: AdmissionError) -> Admission {
        let order_id = order.id;
        if !reason.is_recoverable() {
            warn!(order_id, error = %reason, "dropping order");
            self.ctx.audit(order_id, worker_id, AuditAction::Dropped, Some(reason.to_string()));
            return Admission::Dropped(reason);
        }
        debug!(order_id, error = %reason, "admission deferred");
        order.status = OrderStatus::Pending;
        if let Err(err) = self.ctx.queue().requeue(order) {
            warn!(order_id, error = %err, reason = %reason, "could not requeue order, dropping");
            self.ctx.audit(order_id, worker_id, AuditAction::Dropped, Some(err.to_string()));
            return Admission::Dropped(err);
        }
        self.ctx.audit(order_id, worker_id, AuditAction::Deferred, Some(reason.to_string()));
        Admission::Deferred(reason)
    }

    fn spawn_processing(
        &self,
        worker_id: WorkerId,
        order_id: OrderId,
        cook_time: std::time::Duration,
        permit: OwnedSemaphorePermit,
    ) {
        let ctx = Arc::clone(&self.ctx);
        let guard = CompletionGuard::new(Arc::clone(&ctx), worker_id, order_id);
        self.spawner.spawn(async move {
            let _permit = permit;
            tokio::time::sleep(cook_time).await;
            if let Some((order, worker)) = guard.complete() {
                if let Err(err) = ctx.persist(&worker, &order).await {
                    warn!(order_id, worker_id, error = %err, "completion not persisted");
                }
            }
        });
    }
}

/// Resolves once shutdown is requested or the context is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{KitchenConfig, ToolInventory};
    use crate::core::admission_queue::AdmissionQueue;
    use crate::core::collaborators::{EmptyCatalog, IngredientCatalog};
    use crate::core::audit::{AuditSink, InMemoryAuditSink};
    use crate::core::collaborators::StateRecorder;
    use crate::core::model::{Dish, ToolKind, WorkerStatus};
    use crate::infra::catalog::InMemoryCatalog;
    use crate::infra::state::InMemoryStateStore;
    use crate::runtime::TokioSpawner;

    fn kitchen(inventory: ToolInventory, catalog: Arc<dyn IngredientCatalog>) -> ResourceCoordinator<TokioSpawner> {
        let config = KitchenConfig {
            tools: inventory,
            backoff_ms: 10,
            ..KitchenConfig::default()
        };
        let ctx = Arc::new(KitchenContext::new(config, AdmissionQueue::new(), catalog, None, None));
        ResourceCoordinator::new(ctx, TokioSpawner::current())
    }

    fn burger(id: OrderId, cook_ms: u64) -> Order {
        let dish = Dish::new(1, "burger", 20, [ToolKind::Oven], cook_ms).with_ingredients(["bun"]);
        Order::new(id, Arc::new(dish), 0)
    }

    #[tokio::test]
    async fn test_malformed_order_is_dropped() {
        let coordinator = kitchen(ToolInventory::default(), Arc::new(InMemoryCatalog::standard_warehouse()));
        let outcome = coordinator.admit(Order::without_dish(1, 0)).await;
        assert!(matches!(outcome, Admission::Dropped(AdmissionError::Malformed { .. })));
        assert!(coordinator.context().queue().is_empty());
    }

    #[tokio::test]
    async fn test_unplannable_order_is_requeued() {
        let coordinator = kitchen(ToolInventory::default(), Arc::new(EmptyCatalog));
        let outcome = coordinator.admit(burger(1, 10)).await;
        assert!(matches!(outcome, Admission::Deferred(AdmissionError::PlanningFailed(_))));
        assert_eq!(coordinator.context().queue().len(), 1);
        assert_eq!(coordinator.context().workspace().used(), 0);
    }

    #[tokio::test]
    async fn test_unsafe_order_is_requeued() {
        let none = ToolInventory { oven: 0, fry_pan: 0, fry_pot: 0 };
        let coordinator = kitchen(none, Arc::new(InMemoryCatalog::standard_warehouse()));
        let outcome = coordinator.admit(burger(1, 10)).await;
        assert_eq!(outcome, Admission::Deferred(AdmissionError::UnsafeGrant(1)));
        assert_eq!(coordinator.context().queue().len(), 1);
    }

    #[tokio::test]
    async fn test_granted_order_completes() {
        let coordinator = kitchen(ToolInventory::default(), Arc::new(InMemoryCatalog::standard_warehouse()));
        let outcome = coordinator.admit(burger(1, 20)).await;
        assert_eq!(outcome, Admission::Granted { worker_id: 1 });
        assert_eq!(coordinator.context().workspace().used(), 20);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let ctx = coordinator.context();
        assert_eq!(ctx.workspace().used(), 0);
        assert_eq!(ctx.completed_orders().len(), 1);
        assert!(ctx.workers().snapshot().iter().all(Worker::is_free));
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_resources() {
        let coordinator = kitchen(ToolInventory::default(), Arc::new(EmptyCatalog));
        let ctx = Arc::clone(coordinator.context());
        ctx.allocate_resources(1, &burger(9, 10)).unwrap();

        drop(CompletionGuard::new(Arc::clone(&ctx), 1, 9));

        assert_eq!(ctx.workspace().used(), 0);
        assert!(ctx.tools().iter().all(crate::core::model::Tool::is_free));
        assert!(ctx.completed_orders().is_empty());
        let worker = ctx.workers().snapshot().remove(0);
        assert!(worker.is_free());

        let requeued = ctx.queue().try_dequeue().unwrap();
        assert_eq!(requeued.id, 9);
        assert_eq!(requeued.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_dropped_guard_persists_requeued_order() {
        let store = Arc::new(InMemoryStateStore::new());
        let recorder: Arc<dyn StateRecorder> = store.clone();
        let ctx = Arc::new(KitchenContext::new(
            KitchenConfig::default(),
            AdmissionQueue::new(),
            Arc::new(EmptyCatalog),
            Some(recorder),
            None,
        ));
        ctx.allocate_resources(1, &burger(9, 10)).unwrap();

        drop(CompletionGuard::new(Arc::clone(&ctx), 1, 9));

        for _ in 0..50 {
            if store.order(9).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.order(9).map(|o| o.status), Some(OrderStatus::Pending));
        let stored = store.worker(1).unwrap();
        assert_eq!(stored.status, WorkerStatus::Free);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_deferral_after_close_drops_and_audits() {
        let sink = Arc::new(InMemoryAuditSink::new(16));
        let audit: Arc<dyn AuditSink> = sink.clone();
        let ctx = Arc::new(KitchenContext::new(
            KitchenConfig::default(),
            AdmissionQueue::new(),
            Arc::new(EmptyCatalog),
            None,
            Some(audit),
        ));
        let coordinator = ResourceCoordinator::new(ctx, TokioSpawner::current());
        coordinator.context().queue().close();

        let outcome = coordinator.admit(burger(5, 10)).await;
        assert_eq!(outcome, Admission::Dropped(AdmissionError::QueueClosed));
        assert_eq!(sink.actions_for(5), vec![AuditAction::Dropped]);
    }
}
