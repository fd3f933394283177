//! Banker's-style dry-run safety check.
//!
//! A grant is safe when, after simulating it on copies of the candidate
//! worker and the free tool pool, at least one busy worker (the simulated one
//! or any other) already holds everything its order needs and will therefore
//! finish and release. Real state is never touched.

use tracing::debug;

use crate::core::model::{Order, Tool, ToolStatus, Worker, WorkerStatus, WorkspaceLease};
use crate::core::workspace::WorkspaceSnapshot;

/// Stateless safety checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyChecker;

impl SafetyChecker {
    /// Create a checker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Would granting `order` to `worker` leave at least one worker able to finish?
    #[must_use]
    pub fn is_grant_safe(
        &self,
        worker: &Worker,
        order: &Order,
        free_tools: &[Tool],
        all_workers: &[Worker],
        workspace: &WorkspaceSnapshot,
    ) -> bool {
        let simulated = Self::simulate_grant(worker, order, free_tools, workspace);

        let safe = std::iter::once(&simulated)
            .chain(all_workers.iter().filter(|w| w.id != worker.id))
            .filter(|w| w.status == WorkerStatus::Busy)
            .any(|w| {
                let finishes = w.can_complete();
                debug!(worker_id = w.id, finishes, "safety probe");
                finishes
            });

        debug!(order_id = order.id, worker_id = worker.id, safe, "safety check");
        safe
    }

    /// Grant `order` to a copy of `worker`: first free tool per category,
    /// workspace if total free space allows, then mark busy.
    fn simulate_grant(
        worker: &Worker,
        order: &Order,
        free_tools: &[Tool],
        workspace: &WorkspaceSnapshot,
    ) -> Worker {
        let mut candidate = worker.clone();
        let mut pool: Vec<Tool> = free_tools.to_vec();

        if let Some(dish) = order.dish.as_ref() {
            for kind in dish.acquisition_order() {
                if let Some(tool) = pool
                    .iter_mut()
                    .find(|t| t.kind == kind && t.status == ToolStatus::Free)
                {
                    tool.status = ToolStatus::Occupied;
                    tool.holder = Some(candidate.id);
                    candidate.held_tools.push(tool.handle());
                }
            }
            if dish.required_space <= workspace.free() {
                candidate.workspace = Some(WorkspaceLease {
                    order_id: order.id,
                    start: workspace.used,
                    size: dish.required_space,
                });
            }
        }

        candidate.status = WorkerStatus::Busy;
        candidate.current_order = Some(order.clone());
        candidate
    }
}
