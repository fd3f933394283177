//! Integration tests for the admission loop.
//!
//! These tests run the coordinator on a real Tokio runtime and validate:
//! - End-to-end grant, cooking and release
//! - Rollback when a tool category runs out mid-allocation
//! - Priority ordering across the running loop
//! - Persistence conflicts undoing a grant
//! - Panic containment inside one admission iteration
//! - Graceful shutdown draining in-flight work

use std::sync::Arc;
use std::time::{Duration, Instant};

use kitchen_admission::builders::KitchenBuilder;
use kitchen_admission::config::{KitchenConfig, ToolInventory};
use kitchen_admission::core::{
    Admission, AdmissionError, AuditAction, BaselineSimulator, Dish, IngredientCatalog, KitchenContext,
    Order, OrderStatus, ResourceCoordinator, StateRecorder, ToolKind, ToolStatus, WorkerStatus,
};
use kitchen_admission::infra::{InMemoryCatalog, InMemoryStateStore};
use kitchen_admission::runtime::{health, submit, submit_batch, TokioSpawner};
use kitchen_admission::util::{init_tracing, Position};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn config(workers: usize, tools: ToolInventory) -> KitchenConfig {
    KitchenConfig {
        worker_count: workers,
        tools,
        workspace_capacity: 100,
        backoff_ms: 10,
        ..KitchenConfig::default()
    }
}

fn ovens(n: usize) -> ToolInventory {
    ToolInventory {
        oven: n,
        fry_pan: 0,
        fry_pot: 0,
    }
}

fn dish(space: u32, tools: &[ToolKind], cook_ms: u64) -> Arc<Dish> {
    Arc::new(Dish::new(1, "test dish", space, tools.iter().copied(), cook_ms).with_ingredients(["bun", "sauce"]))
}

fn build(cfg: KitchenConfig) -> ResourceCoordinator<TokioSpawner> {
    init_tracing();
    KitchenBuilder::new(cfg)
        .with_catalog(Arc::new(InMemoryCatalog::standard_warehouse()))
        .build(TokioSpawner::current())
        .expect("valid config")
}

async fn wait_until(ctx: &KitchenContext, timeout: Duration, cond: impl Fn(&KitchenContext) -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond(ctx) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond(ctx)
}

// ============================================================================
// END-TO-END
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_to_end_single_order() {
    let coordinator = build(config(2, ovens(1)));
    let ctx = Arc::clone(coordinator.context());
    let handle = tokio::spawn(coordinator.clone().run());

    let order = Order::new(1, dish(20, &[ToolKind::Oven], 150), 0);
    let created_at = order.created_at_ms;
    submit(&ctx, order).unwrap();

    assert!(wait_until(&ctx, Duration::from_secs(2), |c| c.workers().busy_count() == 1).await);
    let status = ctx.status();
    assert_eq!(status.workspace_used, 20);
    assert_eq!(status.tools[0].status, ToolStatus::Occupied);
    let busy = status.workers.iter().find(|w| w.status == WorkerStatus::Busy).unwrap();
    assert_eq!(busy.current_order.as_ref().map(|o| o.status), Some(OrderStatus::InProgress));

    assert!(wait_until(&ctx, Duration::from_secs(2), |c| c.completed_orders().len() == 1).await);
    let status = ctx.status();
    assert_eq!(status.workspace_used, 0);
    assert!(status.tools.iter().all(|t| t.status == ToolStatus::Free));
    assert!(status.workers.iter().all(|w| w.status == WorkerStatus::Free && w.is_consistent()));

    let done = ctx.completed_orders().remove(0);
    assert_eq!(done.status, OrderStatus::Completed);
    assert!(done.completed_at_ms.unwrap() > created_at);

    ctx.shutdown().await;
    handle.await.unwrap();
}

// ============================================================================
// ROLLBACK
// ============================================================================

#[tokio::test]
async fn test_rollback_when_last_tool_missing() {
    let coordinator = build(config(1, ovens(1)));
    let ctx = coordinator.context();
    let before = ctx.workspace().free();

    let order = Order::new(1, dish(30, &[ToolKind::Oven, ToolKind::FryPan], 10), 0);
    let err = ctx.allocate_resources(1, &order).unwrap_err();
    assert_eq!(err, AdmissionError::ToolUnavailable(ToolKind::FryPan));

    assert_eq!(ctx.workspace().free(), before);
    assert!(ctx.tools().iter().all(|t| t.status == ToolStatus::Free && t.holder.is_none()));
    let worker = ctx.workers().snapshot().remove(0);
    assert_eq!(worker.status, WorkerStatus::Free);
    assert!(worker.current_order.is_none());
    assert!(worker.is_consistent());
    ctx.workspace().check_invariants().unwrap();
}

// ============================================================================
// PRIORITY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_priority_order_through_the_loop() {
    let coordinator = build(config(1, ovens(1)));
    let ctx = Arc::clone(coordinator.context());
    let d = dish(10, &[ToolKind::Oven], 20);

    let receipt = submit_batch(
        &ctx,
        [
            Order::new(1, Arc::clone(&d), 1).with_created_at(1),
            Order::new(2, Arc::clone(&d), 5).with_created_at(2),
            Order::new(3, Arc::clone(&d), 3).with_created_at(3),
            Order::new(4, Arc::clone(&d), 3).with_created_at(4),
        ],
    );
    assert_eq!(receipt.accepted.len(), 4);

    let handle = tokio::spawn(coordinator.clone().run());
    assert!(wait_until(&ctx, Duration::from_secs(3), |c| c.completed_orders().len() == 4).await);

    let ids: Vec<u64> = ctx.completed_orders().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![2, 3, 4, 1]);

    ctx.shutdown().await;
    handle.await.unwrap();
}

// ============================================================================
// CONTENTION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_contended_oven_serializes_orders() {
    let (builder, audit) = KitchenBuilder::new(config(2, ovens(1)))
        .with_catalog(Arc::new(InMemoryCatalog::standard_warehouse()))
        .with_in_memory_audit();
    let coordinator = builder.build(TokioSpawner::current()).unwrap();
    let ctx = Arc::clone(coordinator.context());
    let d = dish(20, &[ToolKind::Oven], 80);

    submit(&ctx, Order::new(1, Arc::clone(&d), 5)).unwrap();
    submit(&ctx, Order::new(2, d, 1)).unwrap();
    let handle = tokio::spawn(coordinator.clone().run());

    assert!(wait_until(&ctx, Duration::from_secs(3), |c| c.completed_orders().len() == 2).await);
    let ids: Vec<u64> = ctx.completed_orders().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let second = audit.actions_for(2);
    assert!(second.contains(&AuditAction::Deferred));
    assert_eq!(second.last(), Some(&AuditAction::Completed));

    ctx.shutdown().await;
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_opposite_tool_orders_complete_where_baseline_deadlocks() {
    let tools = ToolInventory {
        oven: 1,
        fry_pan: 1,
        fry_pot: 0,
    };
    let orders = vec![
        Order::new(1, dish(10, &[ToolKind::Oven, ToolKind::FryPan], 30), 0),
        Order::new(2, dish(10, &[ToolKind::FryPan, ToolKind::Oven], 30), 0),
    ];

    let baseline = BaselineSimulator::new(tools, 2).run(&orders);
    assert!(baseline.deadlocked);

    let coordinator = build(config(2, tools));
    let ctx = Arc::clone(coordinator.context());
    submit_batch(&ctx, orders);
    let handle = tokio::spawn(coordinator.clone().run());

    assert!(wait_until(&ctx, Duration::from_secs(3), |c| c.completed_orders().len() == 2).await);

    ctx.shutdown().await;
    handle.await.unwrap();
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_persistence_conflict_requeues_order() {
    let store = Arc::new(InMemoryStateStore::new());
    store.bump_worker_version(1, 100);
    let recorder: Arc<dyn StateRecorder> = store.clone();

    let coordinator = KitchenBuilder::new(config(1, ovens(1)))
        .with_catalog(Arc::new(InMemoryCatalog::standard_warehouse()))
        .with_recorder(recorder)
        .build(TokioSpawner::current())
        .unwrap();
    let ctx = coordinator.context();

    let outcome = coordinator.admit(Order::new(7, dish(20, &[ToolKind::Oven], 10), 0)).await;
    assert_eq!(
        outcome,
        Admission::Deferred(AdmissionError::Conflict {
            worker_id: 1,
            stored: 100,
            attempted: 1,
        })
    );

    assert_eq!(ctx.queue().len(), 1);
    assert_eq!(ctx.queue().pending()[0].status, OrderStatus::Pending);
    assert_eq!(ctx.workspace().used(), 0);
    assert!(ctx.tools().iter().all(|t| t.status == ToolStatus::Free));
    assert!(ctx.workers().snapshot()[0].is_free());
    assert!(store.order(7).is_none());
}

#[tokio::test]
async fn test_tool_rollback_is_persisted() {
    let store = Arc::new(InMemoryStateStore::new());
    let recorder: Arc<dyn StateRecorder> = store.clone();
    let tools = ToolInventory {
        oven: 1,
        fry_pan: 1,
        fry_pot: 0,
    };
    let coordinator = KitchenBuilder::new(config(2, tools))
        .with_catalog(Arc::new(InMemoryCatalog::standard_warehouse()))
        .with_recorder(recorder)
        .build(TokioSpawner::current())
        .unwrap();
    let ctx = coordinator.context();

    // worker 2 holds the only pan and can finish, so the grant passes the dry run
    ctx.allocate_resources(2, &Order::new(1, dish(10, &[ToolKind::FryPan], 10), 0))
        .unwrap();

    let outcome = coordinator
        .admit(Order::new(2, dish(20, &[ToolKind::Oven, ToolKind::FryPan], 10), 0))
        .await;
    assert_eq!(outcome, Admission::Deferred(AdmissionError::ToolUnavailable(ToolKind::FryPan)));

    let stored = store.worker(1).unwrap();
    assert_eq!(stored.status, WorkerStatus::Free);
    assert_eq!(stored.version, 1);
    assert_eq!(store.order(2).map(|o| o.status), Some(OrderStatus::Pending));
    assert_eq!(ctx.queue().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_persistence_records_grant_and_release() {
    let store = Arc::new(InMemoryStateStore::new());
    let recorder: Arc<dyn StateRecorder> = store.clone();
    let coordinator = KitchenBuilder::new(config(1, ovens(1)))
        .with_catalog(Arc::new(InMemoryCatalog::standard_warehouse()))
        .with_recorder(recorder)
        .build(TokioSpawner::current())
        .unwrap();
    let ctx = Arc::clone(coordinator.context());

    let outcome = coordinator.admit(Order::new(3, dish(20, &[ToolKind::Oven], 20), 0)).await;
    assert_eq!(outcome, Admission::Granted { worker_id: 1 });
    assert_eq!(store.worker(1).map(|w| w.status), Some(WorkerStatus::Busy));

    let recorded_completion = |_: &KitchenContext| store.order(3).map(|o| o.status) == Some(OrderStatus::Completed);
    assert!(wait_until(&ctx, Duration::from_secs(2), recorded_completion).await);
    let stored = store.worker(1).unwrap();
    assert_eq!(stored.status, WorkerStatus::Free);
    assert_eq!(stored.version, 2);
    assert_eq!(stored.order_id, None);
}

// ============================================================================
// FAILURE CONTAINMENT
// ============================================================================

struct PoisonedCatalog(InMemoryCatalog);

impl IngredientCatalog for PoisonedCatalog {
    fn position_of(&self, ingredient: &str) -> Option<Position> {
        assert_ne!(ingredient, "poison", "catalog lookup exploded");
        self.0.position_of(ingredient)
    }

    fn ingredient_at(&self, position: Position) -> Option<String> {
        self.0.ingredient_at(position)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_iteration_does_not_stop_the_loop() {
    let coordinator = KitchenBuilder::new(config(1, ovens(1)))
        .with_catalog(Arc::new(PoisonedCatalog(InMemoryCatalog::standard_warehouse())))
        .build(TokioSpawner::current())
        .unwrap();
    let ctx = Arc::clone(coordinator.context());

    let poison = Arc::new(Dish::new(9, "poison pie", 10, [ToolKind::Oven], 10).with_ingredients(["poison"]));
    submit(&ctx, Order::new(1, poison, 9)).unwrap();
    submit(&ctx, Order::new(2, dish(10, &[ToolKind::Oven], 10), 1)).unwrap();

    let handle = tokio::spawn(coordinator.clone().run());
    assert!(wait_until(&ctx, Duration::from_secs(2), |c| c.completed_orders().len() == 1).await);
    assert_eq!(ctx.completed_orders()[0].id, 2);
    assert!(ctx.workers().snapshot()[0].is_free());

    ctx.shutdown().await;
    handle.await.unwrap();
}

// ============================================================================
// SHUTDOWN
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_drains_in_flight_work() {
    let coordinator = build(config(2, ovens(2)));
    let ctx = Arc::clone(coordinator.context());
    let handle = tokio::spawn(coordinator.clone().run());

    submit(&ctx, Order::new(1, dish(20, &[ToolKind::Oven], 200), 0)).unwrap();
    assert!(wait_until(&ctx, Duration::from_secs(2), |c| c.workers().busy_count() == 1).await);

    ctx.shutdown().await;
    handle.await.unwrap();

    assert_eq!(ctx.completed_orders().len(), 1);
    assert_eq!(ctx.workspace().used(), 0);
    assert!(!health(&ctx).ok);
    assert_eq!(
        submit(&ctx, Order::new(2, dish(20, &[ToolKind::Oven], 10), 0)),
        Err(AdmissionError::QueueClosed)
    );
}
