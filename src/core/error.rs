//! Error types for admission and allocation.

use thiserror::Error;

use crate::core::model::ToolKind;
use crate::util::serde::{OrderId, WorkerId};

/// Errors produced by admission-control components.
///
/// Every variant except [`AdmissionError::Malformed`] is recoverable: the
/// order goes back into the queue and is retried on a later cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The order is structurally invalid and will never be admitted.
    #[error("malformed order {order_id}: {reason}")]
    Malformed {
        /// Offending order.
        order_id: OrderId,
        /// Why it was rejected.
        reason: String,
    },
    /// Every worker is busy.
    #[error("no free worker")]
    NoFreeWorker,
    /// The dry-run grant left no worker able to finish.
    #[error("grant for order {0} would be unsafe")]
    UnsafeGrant(OrderId),
    /// The tool pool for a category is exhausted.
    #[error("no free {0:?}")]
    ToolUnavailable(ToolKind),
    /// Enough workspace exists in total but not for this request, even after compaction.
    #[error("insufficient workspace: requested {requested}, free {free}")]
    InsufficientSpace {
        /// Units requested.
        requested: u32,
        /// Units currently free.
        free: u32,
    },
    /// The request can never fit in the workspace.
    #[error("request of {requested} exceeds workspace capacity {capacity}")]
    ExceedsCapacity {
        /// Units requested.
        requested: u32,
        /// Total workspace capacity.
        capacity: u32,
    },
    /// The order already owns a partition.
    #[error("order {0} already holds a partition")]
    AlreadyAllocated(OrderId),
    /// No partition is bound to the order.
    #[error("order {0} holds no partition")]
    NotAllocated(OrderId),
    /// Ingredient positions could not be resolved.
    #[error("planning failed: {0}")]
    PlanningFailed(String),
    /// Persisted worker state moved underneath us.
    #[error("version conflict on worker {worker_id}: expected newer than {stored}, got {attempted}")]
    Conflict {
        /// Worker whose record conflicted.
        worker_id: WorkerId,
        /// Version already stored.
        stored: u64,
        /// Version we tried to write.
        attempted: u64,
    },
    /// The chosen worker was taken between lookup and allocation.
    #[error("worker {0} is busy")]
    WorkerBusy(WorkerId),
    /// The worker id is not part of the fleet.
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),
    /// The processing pool has no free slot.
    #[error("processing capacity exhausted")]
    NoProcessingSlot,
    /// The admission queue has been closed.
    #[error("admission queue closed")]
    QueueClosed,
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl AdmissionError {
    /// Whether the order should be requeued rather than dropped.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Malformed { .. } | Self::QueueClosed | Self::InvalidConfig(_)
        )
    }
}

/// Errors reported by a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// A newer (or equal) version is already stored.
    #[error("stale write: stored version {stored}, attempted {attempted}")]
    Conflict {
        /// Version already stored.
        stored: u64,
        /// Version the caller tried to write.
        attempted: u64,
    },
    /// The backend is unavailable or failed.
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
