//! Identifier aliases shared across the crate and its serialized views.

/// Identifier of an order (work item).
pub type OrderId = u64;

/// Identifier of a worker (robot).
pub type WorkerId = u32;

/// Identifier of a tool (appliance).
pub type ToolId = u32;

/// Identifier of a dish (profile).
pub type DishId = u32;

/// Order priority. Higher values are more urgent.
pub type PriorityLevel = i32;

/// A location on the warehouse shelf line.
pub type Position = i64;
