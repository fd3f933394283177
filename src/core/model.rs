//! Domain model: dishes, orders, tools and workers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::AdmissionError;
use crate::util::clock::now_ms;
use crate::util::serde::{DishId, OrderId, PriorityLevel, ToolId, WorkerId};

/// Appliance category. The derived ordering is the global acquisition order
/// used by the coordinator (oven, then fry pan, then fry pot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Oven.
    Oven,
    /// Fry pan.
    FryPan,
    /// Deep fry pot.
    FryPot,
}

impl ToolKind {
    /// All categories in acquisition order.
    pub const ALL: [Self; 3] = [Self::Oven, Self::FryPan, Self::FryPot];
}

/// Resource-requirement template for an order. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    /// Dish identifier.
    pub id: DishId,
    /// Display name.
    pub name: String,
    /// Workspace units the dish occupies while cooking.
    pub required_space: u32,
    /// Required tool categories, in the order the recipe lists them.
    pub tools: Vec<ToolKind>,
    /// Fixed processing duration in milliseconds.
    pub cook_time_ms: u64,
    /// Price, only used by downstream accounting.
    pub price: u32,
    /// Ingredient names to fetch from the warehouse.
    pub ingredients: Vec<String>,
}

impl Dish {
    /// Create a dish. Duplicate tool categories are collapsed, keeping the first mention.
    pub fn new(
        id: DishId,
        name: impl Into<String>,
        required_space: u32,
        tools: impl IntoIterator<Item = ToolKind>,
        cook_time_ms: u64,
    ) -> Self {
        let mut listed = Vec::new();
        for kind in tools {
            if !listed.contains(&kind) {
                listed.push(kind);
            }
        }
        Self {
            id,
            name: name.into(),
            required_space,
            tools: listed,
            cook_time_ms,
            price: 0,
            ingredients: Vec::new(),
        }
    }

    /// Attach the ingredient list.
    #[must_use]
    pub fn with_ingredients<I, S>(mut self, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingredients = ingredients.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a price.
    #[must_use]
    pub const fn with_price(mut self, price: u32) -> Self {
        self.price = price;
        self
    }

    /// Whether the dish needs a tool of `kind`.
    #[must_use]
    pub fn needs(&self, kind: ToolKind) -> bool {
        self.tools.contains(&kind)
    }

    /// Required categories sorted into the global acquisition order.
    #[must_use]
    pub fn acquisition_order(&self) -> Vec<ToolKind> {
        let mut kinds = self.tools.clone();
        kinds.sort_unstable();
        kinds.dedup();
        kinds
    }

    /// Processing duration.
    #[must_use]
    pub const fn cook_time(&self) -> Duration {
        Duration::from_millis(self.cook_time_ms)
    }

    /// The six dishes the kitchen serves out of the box.
    #[must_use]
    pub fn standard_menu() -> Vec<Self> {
        use ToolKind::{FryPan, FryPot, Oven};
        vec![
            Self::new(1, "Spicy Chicken Burger", 20, [Oven], 1500)
                .with_price(15)
                .with_ingredients(["bun", "chicken", "lettuce", "sauce"]),
            Self::new(2, "Big Burger", 30, [FryPot, Oven], 2500)
                .with_price(20)
                .with_ingredients(["bun", "beef_patty", "cheese", "lettuce", "onion", "pickle", "sauce"]),
            Self::new(3, "Double Cheeseburger", 25, [FryPan, Oven], 2000)
                .with_price(15)
                .with_ingredients(["bun", "beef_patty", "cheese", "onion", "pickle", "sauce"]),
            Self::new(4, "Hamburger", 15, [FryPot, FryPan], 1000)
                .with_price(10)
                .with_ingredients(["bun", "beef_patty", "onion", "pickle", "sauce"]),
            Self::new(5, "Chicken Nuggets", 20, [FryPot], 1800)
                .with_price(12)
                .with_ingredients(["chicken", "starch", "sauce"]),
            Self::new(6, "Egg Muffin", 40, [FryPot, FryPan, Oven], 3000)
                .with_price(18)
                .with_ingredients(["bun", "ham", "fried_egg", "cheese", "sauce"]),
        ]
    }
}

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for admission.
    Pending,
    /// Holding resources and cooking.
    InProgress,
    /// Finished; immutable from here on.
    Completed,
}

/// A unit of work: one dish to be cooked by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Requirement template; `None` marks a malformed order.
    pub dish: Option<Arc<Dish>>,
    /// Higher is more urgent.
    pub priority: PriorityLevel,
    /// Creation timestamp (ms since epoch).
    pub created_at_ms: u128,
    /// Completion timestamp (ms since epoch), set once.
    pub completed_at_ms: Option<u128>,
    /// Lifecycle state.
    pub status: OrderStatus,
}

impl Order {
    /// A pending order created now.
    #[must_use]
    pub fn new(id: OrderId, dish: Arc<Dish>, priority: PriorityLevel) -> Self {
        Self {
            id,
            dish: Some(dish),
            priority,
            created_at_ms: now_ms(),
            completed_at_ms: None,
            status: OrderStatus::Pending,
        }
    }

    /// An order with no dish attached. Admission always rejects it.
    #[must_use]
    pub fn without_dish(id: OrderId, priority: PriorityLevel) -> Self {
        Self {
            id,
            dish: None,
            priority,
            created_at_ms: now_ms(),
            completed_at_ms: None,
            status: OrderStatus::Pending,
        }
    }

    /// Override the creation timestamp.
    #[must_use]
    pub const fn with_created_at(mut self, created_at_ms: u128) -> Self {
        self.created_at_ms = created_at_ms;
        self
    }

    /// Check structural validity and return the dish.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Malformed`] when the dish is missing or needs no workspace.
    pub fn validate(&self) -> Result<&Arc<Dish>, AdmissionError> {
        let dish = self.dish.as_ref().ok_or_else(|| AdmissionError::Malformed {
            order_id: self.id,
            reason: "no dish attached".into(),
        })?;
        if dish.required_space == 0 {
            return Err(AdmissionError::Malformed {
                order_id: self.id,
                reason: format!("dish `{}` requires no workspace", dish.name),
            });
        }
        Ok(dish)
    }

    /// Workspace units required, zero when there is no dish.
    #[must_use]
    pub fn required_space(&self) -> u32 {
        self.dish.as_ref().map_or(0, |d| d.required_space)
    }

    /// Dish name for display, or `"<none>"`.
    #[must_use]
    pub fn dish_name(&self) -> &str {
        self.dish.as_ref().map_or("<none>", |d| d.name.as_str())
    }
}

/// Status of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Available.
    Free,
    /// Held by a worker.
    Occupied,
}

/// A shared appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool identifier.
    pub id: ToolId,
    /// Category.
    pub kind: ToolKind,
    /// Current status.
    pub status: ToolStatus,
    /// Worker holding the tool.
    pub holder: Option<WorkerId>,
}

impl Tool {
    /// A free tool.
    #[must_use]
    pub const fn new(id: ToolId, kind: ToolKind) -> Self {
        Self {
            id,
            kind,
            status: ToolStatus::Free,
            holder: None,
        }
    }

    /// Whether the tool is free.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.status == ToolStatus::Free
    }

    /// Reference held by a worker.
    #[must_use]
    pub const fn handle(&self) -> ToolHandle {
        ToolHandle {
            id: self.id,
            kind: self.kind,
        }
    }
}

/// A worker's reference to a tool it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHandle {
    /// Tool identifier.
    pub id: ToolId,
    /// Category.
    pub kind: ToolKind,
}

/// A worker's claim on a workspace partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLease {
    /// Order the partition serves.
    pub order_id: OrderId,
    /// Start offset.
    pub start: u32,
    /// Size in units.
    pub size: u32,
}

/// Status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Idle, holding nothing.
    Free,
    /// Bound to an order.
    Busy,
}

/// A robot that cooks one order at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Worker identifier.
    pub id: WorkerId,
    /// Current status.
    pub status: WorkerStatus,
    /// Order being cooked.
    pub current_order: Option<Order>,
    /// Tools held for the current order.
    pub held_tools: Vec<ToolHandle>,
    /// Workspace held for the current order.
    pub workspace: Option<WorkspaceLease>,
    /// Bumped on every committed grant or release.
    pub version: u64,
}

impl Worker {
    /// A free worker holding nothing.
    #[must_use]
    pub const fn new(id: WorkerId) -> Self {
        Self {
            id,
            status: WorkerStatus::Free,
            current_order: None,
            held_tools: Vec::new(),
            workspace: None,
            version: 0,
        }
    }

    /// Whether the worker is free.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.status == WorkerStatus::Free
    }

    /// Whether the worker holds a tool of `kind`.
    #[must_use]
    pub fn holds(&self, kind: ToolKind) -> bool {
        self.held_tools.iter().any(|t| t.kind == kind)
    }

    /// A busy worker that already holds every tool and the workspace its
    /// order needs will finish and release everything.
    #[must_use]
    pub fn can_complete(&self) -> bool {
        if self.status != WorkerStatus::Busy {
            return false;
        }
        let Some(dish) = self.current_order.as_ref().and_then(|o| o.dish.as_ref()) else {
            return false;
        };
        dish.tools.iter().all(|kind| self.holds(*kind)) && self.workspace.is_some()
    }

    /// A free worker must hold nothing.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match self.status {
            WorkerStatus::Free => {
                self.current_order.is_none() && self.held_tools.is_empty() && self.workspace.is_none()
            }
            WorkerStatus::Busy => self.current_order.is_some(),
        }
    }

    /// Return to free, dropping every reference. Leaves `version` untouched.
    pub fn clear(&mut self) {
        self.status = WorkerStatus::Free;
        self.current_order = None;
        self.held_tools.clear();
        self.workspace = None;
    }
}
