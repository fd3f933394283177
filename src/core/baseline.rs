//! Greedy hold-and-wait baseline.
//!
//! Runs the same worker and tool shapes as the kitchen but grants tools
//! greedily, one at a time, in each dish's declared order and with no safety
//! check. It exists to show the circular waits that the admission gate
//! prevents. It works on deep copies and never touches live state.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ToolInventory;
use crate::core::model::{Order, ToolKind};
use crate::util::serde::{OrderId, WorkerId};

/// Outcome of a baseline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineReport {
    /// Finished orders with the tick they finished on.
    pub completed: Vec<(OrderId, u64)>,
    /// Orders that never finished.
    pub stranded: Vec<OrderId>,
    /// Whether the run stopped because no worker could make progress.
    pub deadlocked: bool,
    /// Ticks simulated.
    pub ticks: u64,
}

#[derive(Debug)]
struct Job {
    order: Order,
    held: Vec<ToolKind>,
    cooking_left: Option<u64>,
}

impl Job {
    fn next_missing(&self) -> Option<ToolKind> {
        let dish = self.order.dish.as_ref()?;
        dish.tools.iter().copied().find(|kind| !self.held.contains(kind))
    }
}

#[derive(Debug)]
struct SimWorker {
    id: WorkerId,
    job: Option<Job>,
}

/// Tick-based greedy simulator.
#[derive(Debug, Clone)]
pub struct BaselineSimulator {
    inventory: ToolInventory,
    worker_count: usize,
    tick_ms: u64,
    max_ticks: u64,
}

impl BaselineSimulator {
    /// Simulator over the given fleet. One tick is 100 ms of cooking.
    #[must_use]
    pub const fn new(inventory: ToolInventory, worker_count: usize) -> Self {
        Self {
            inventory,
            worker_count,
            tick_ms: 100,
            max_ticks: 10_000,
        }
    }

    /// Override the tick length.
    #[must_use]
    pub const fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = if tick_ms == 0 { 1 } else { tick_ms };
        self
    }

    /// Override the tick cap.
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Simulate `orders` in the given arrival order.
    #[must_use]
    pub fn run(&self, orders: &[Order]) -> BaselineReport {
        let mut pending: VecDeque<Order> = orders
            .iter()
            .filter(|o| o.validate().is_ok())
            .map(deep_copy)
            .collect();
        let mut free = ToolKind::ALL.map(|kind| self.inventory.count(kind));
        let mut workers: Vec<SimWorker> = (1..)
            .take(self.worker_count)
            .map(|id| SimWorker { id, job: None })
            .collect();
        let mut report = BaselineReport::default();

        while !pending.is_empty() || workers.iter().any(|w| w.job.is_some()) {
            if report.ticks >= self.max_ticks {
                warn!(ticks = report.ticks, "baseline hit tick cap");
                break;
            }
            report.ticks += 1;
            let tick = report.ticks;
            let mut progressed = false;

            for worker in &mut workers {
                let Some(job) = worker.job.as_mut() else { continue };
                let Some(left) = job.cooking_left.as_mut() else { continue };
                *left = left.saturating_sub(1);
                progressed = true;
                if *left == 0 {
                    for kind in &job.held {
                        free[slot(*kind)] += 1;
                    }
                    debug!(order_id = job.order.id, worker_id = worker.id, tick, "baseline order finished");
                    report.completed.push((job.order.id, tick));
                    worker.job = None;
                }
            }

            for worker in workers.iter_mut().filter(|w| w.job.is_none()) {
                let Some(order) = pending.pop_front() else { break };
                worker.job = Some(Job {
                    order,
                    held: Vec::new(),
                    cooking_left: None,
                });
                progressed = true;
            }

            for worker in &mut workers {
                let Some(job) = worker.job.as_mut() else { continue };
                if job.cooking_left.is_some() {
                    continue;
                }
                if let Some(kind) = job.next_missing() {
                    if free[slot(kind)] > 0 {
                        free[slot(kind)] -= 1;
                        job.held.push(kind);
                        progressed = true;
                    }
                }
                if job.next_missing().is_none() {
                    job.cooking_left = Some(self.cook_ticks(&job.order));
                    progressed = true;
                }
            }

            if !progressed {
                warn!(tick, "baseline deadlocked: every worker is waiting on a held tool");
                report.deadlocked = true;
                break;
            }
        }

        report.stranded = workers
            .iter()
            .filter_map(|w| w.job.as_ref().map(|j| j.order.id))
            .chain(pending.iter().map(|o| o.id))
            .collect();
        report
    }

    fn cook_ticks(&self, order: &Order) -> u64 {
        let ms = order.dish.as_ref().map_or(0, |d| d.cook_time_ms);
        ms.div_ceil(self.tick_ms).max(1)
    }
}

const fn slot(kind: ToolKind) -> usize {
    match kind {
        ToolKind::Oven => 0,
        ToolKind::FryPan => 1,
        ToolKind::FryPot => 2,
    }
}

fn deep_copy(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.dish = order.dish.as_ref().map(|d| Arc::new((**d).clone()));
    copy
}
