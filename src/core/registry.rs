//! Fixed-size tool and worker pools.
//!
//! Tools and the workspace live together in [`PoolState`] behind the single
//! pool lock. Each worker sits behind its own lock in [`WorkerRegistry`].
//! Callers that need both always take the pool lock first.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::ToolInventory;
use crate::core::model::{Tool, ToolHandle, ToolKind, ToolStatus, Worker};
use crate::core::workspace::WorkspaceAllocator;
use crate::util::serde::{ToolId, WorkerId};

/// Typed tool pool. Size per category is fixed at construction.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Build the pool with ids assigned in acquisition order of category.
    #[must_use]
    pub fn new(inventory: &ToolInventory) -> Self {
        let mut tools = Vec::with_capacity(inventory.total());
        let mut next_id: ToolId = 1;
        for kind in ToolKind::ALL {
            for _ in 0..inventory.count(kind) {
                tools.push(Tool::new(next_id, kind));
                next_id += 1;
            }
        }
        Self { tools }
    }

    /// All tools.
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Copies of every free tool.
    #[must_use]
    pub fn free_tools(&self) -> Vec<Tool> {
        self.tools.iter().filter(|t| t.is_free()).cloned().collect()
    }

    /// Number of free tools of `kind`.
    #[must_use]
    pub fn free_count(&self, kind: ToolKind) -> usize {
        self.tools.iter().filter(|t| t.kind == kind && t.is_free()).count()
    }

    /// Occupy the first free tool of `kind` on behalf of `worker`.
    pub fn acquire(&mut self, kind: ToolKind, worker: WorkerId) -> Option<ToolHandle> {
        let tool = self.tools.iter_mut().find(|t| t.kind == kind && t.is_free())?;
        tool.status = ToolStatus::Occupied;
        tool.holder = Some(worker);
        debug!(tool_id = tool.id, ?kind, worker_id = worker, "tool acquired");
        Some(tool.handle())
    }

    /// Free a tool. Returns `false` if the tool is unknown or already free.
    pub fn release(&mut self, tool_id: ToolId) -> bool {
        match self.tools.iter_mut().find(|t| t.id == tool_id) {
            Some(tool) if !tool.is_free() => {
                tool.status = ToolStatus::Free;
                tool.holder = None;
                debug!(tool_id, "tool released");
                true
            }
            _ => false,
        }
    }
}

/// Everything guarded by the pool lock.
#[derive(Debug, Clone)]
pub struct PoolState {
    /// Tool pool.
    pub tools: ToolRegistry,
    /// Shared workspace.
    pub workspace: WorkspaceAllocator,
}

impl PoolState {
    /// Fresh pools.
    #[must_use]
    pub fn new(inventory: &ToolInventory, workspace_capacity: u32) -> Self {
        Self {
            tools: ToolRegistry::new(inventory),
            workspace: WorkspaceAllocator::new(workspace_capacity),
        }
    }
}

/// Worker fleet with one lock per worker, keyed by worker id.
#[derive(Debug)]
pub struct WorkerRegistry {
    ids: Vec<WorkerId>,
    cells: DashMap<WorkerId, Arc<Mutex<Worker>>>,
}

impl WorkerRegistry {
    /// Workers numbered `1..=count`, all free.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let ids: Vec<WorkerId> = (1..).take(count).collect();
        let cells = DashMap::with_capacity(count);
        for id in &ids {
            cells.insert(*id, Arc::new(Mutex::new(Worker::new(*id))));
        }
        Self { ids, cells }
    }

    /// Worker ids in scan order.
    #[must_use]
    pub fn ids(&self) -> &[WorkerId] {
        &self.ids
    }

    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the fleet is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The lock guarding worker `id`. The map shard is released before returning.
    #[must_use]
    pub fn cell(&self, id: WorkerId) -> Option<Arc<Mutex<Worker>>> {
        self.cells.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// First free worker in id order.
    #[must_use]
    pub fn find_free(&self) -> Option<WorkerId> {
        self.ids.iter().copied().find(|id| {
            self.cell(*id).is_some_and(|cell| cell.lock().is_free())
        })
    }

    /// Copies of every worker, in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Worker> {
        self.ids
            .iter()
            .filter_map(|id| self.cell(*id))
            .map(|cell| cell.lock().clone())
            .collect()
    }

    /// Number of busy workers.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.snapshot().iter().filter(|w| !w.is_free()).count()
    }
}
