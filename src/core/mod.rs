//! Admission-control core: domain model, pools, safety and the admission loop.

pub mod admission_queue;
pub mod audit;
pub mod baseline;
pub mod collaborators;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod planner;
pub mod registry;
pub mod safety;
pub mod workspace;

pub use admission_queue::{AdmissionQueue, NoAging, PriorityAging, QueueEntry};
pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use baseline::{BaselineReport, BaselineSimulator};
pub use collaborators::{EmptyCatalog, IngredientCatalog, Spawn, StateRecorder};
pub use context::{KitchenContext, KitchenStatus};
pub use coordinator::{Admission, CompletionGuard, ResourceCoordinator};
pub use error::{AdmissionError, AppResult, PersistError};
pub use model::{
    Dish, Order, OrderStatus, Tool, ToolHandle, ToolKind, ToolStatus, Worker, WorkerStatus, WorkspaceLease,
};
pub use planner::{PathPlan, PlanPolicy, PlanSet, WarehousePathPlanner};
pub use registry::{PoolState, ToolRegistry, WorkerRegistry};
pub use safety::SafetyChecker;
pub use workspace::{Partition, PartitionOwner, WorkspaceAllocator, WorkspaceSnapshot};
