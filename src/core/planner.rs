//! Warehouse retrieval path planning.
//!
//! Given the positions of the ingredients a dish needs, compute a visiting
//! order and its cost under three disk-scheduling style policies. Cost
//! between two positions is their absolute difference.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::collaborators::IngredientCatalog;
use crate::core::error::AdmissionError;
use crate::core::model::Dish;
use crate::util::serde::Position;

/// Visiting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPolicy {
    /// Visit in the order given.
    ArrivalOrder,
    /// Always visit the nearest unvisited position next.
    ShortestSeekFirst,
    /// Sweep upward from the start, then reverse.
    DirectionalSweep,
}

impl PlanPolicy {
    /// All policies, in tie-break order.
    pub const ALL: [Self; 3] = [Self::ArrivalOrder, Self::ShortestSeekFirst, Self::DirectionalSweep];
}

impl fmt::Display for PlanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ArrivalOrder => "arrival-order",
            Self::ShortestSeekFirst => "shortest-seek-first",
            Self::DirectionalSweep => "directional-sweep",
        };
        f.write_str(name)
    }
}

/// Visiting order and cost under one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPlan {
    /// Policy that produced the plan.
    pub policy: PlanPolicy,
    /// Where the picker starts.
    pub start: Position,
    /// Positions in visiting order.
    pub order: Vec<Position>,
    /// Distance travelled for each step.
    pub step_costs: Vec<u64>,
    /// Sum of `step_costs`.
    pub total_cost: u64,
}

impl PathPlan {
    fn from_route(policy: PlanPolicy, start: Position, order: Vec<Position>) -> Self {
        let mut current = start;
        let step_costs: Vec<u64> = order
            .iter()
            .map(|next| {
                let cost = current.abs_diff(*next);
                current = *next;
                cost
            })
            .collect();
        let total_cost = step_costs.iter().sum();
        Self {
            policy,
            start,
            order,
            step_costs,
            total_cost,
        }
    }

    /// One line per step, `from → to (ingredient) dist=N`.
    #[must_use]
    pub fn describe_steps(&self, catalog: &dyn IngredientCatalog) -> Vec<String> {
        let mut from = self.start;
        self.order
            .iter()
            .zip(&self.step_costs)
            .map(|(to, cost)| {
                let label = catalog.ingredient_at(*to).unwrap_or_else(|| "?".into());
                let line = format!("{from} → {to} ({label}) dist={cost}");
                from = *to;
                line
            })
            .collect()
    }
}

/// Plans under every policy for the same input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSet {
    /// One plan per policy, in [`PlanPolicy::ALL`] order.
    pub plans: Vec<PathPlan>,
}

impl PlanSet {
    /// The plan produced by `policy`.
    #[must_use]
    pub fn get(&self, policy: PlanPolicy) -> Option<&PathPlan> {
        self.plans.iter().find(|p| p.policy == policy)
    }

    /// Cheapest plan; the earlier policy wins ties.
    #[must_use]
    pub fn best(&self) -> Option<&PathPlan> {
        self.plans.iter().min_by_key(|p| p.total_cost)
    }
}

/// Computes retrieval paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarehousePathPlanner {
    start: Position,
}

impl WarehousePathPlanner {
    /// Planner whose picker starts at `start`.
    #[must_use]
    pub const fn new(start: Position) -> Self {
        Self { start }
    }

    /// Configured start position.
    #[must_use]
    pub const fn start(&self) -> Position {
        self.start
    }

    /// Plan `positions` from `start` under every policy.
    ///
    /// # Errors
    ///
    /// `PlanningFailed` when `positions` is empty.
    pub fn plan(positions: &[Position], start: Position) -> Result<PlanSet, AdmissionError> {
        if positions.is_empty() {
            return Err(AdmissionError::PlanningFailed("no positions to visit".into()));
        }
        let plans = PlanPolicy::ALL
            .iter()
            .map(|policy| {
                let route = match policy {
                    PlanPolicy::ArrivalOrder => positions.to_vec(),
                    PlanPolicy::ShortestSeekFirst => shortest_seek_first(positions, start),
                    PlanPolicy::DirectionalSweep => directional_sweep(positions, start),
                };
                PathPlan::from_route(*policy, start, route)
            })
            .collect();
        Ok(PlanSet { plans })
    }

    /// Resolve the dish's ingredients through `catalog` and plan the retrieval.
    ///
    /// # Errors
    ///
    /// `PlanningFailed` when none of the ingredients can be located.
    pub fn plan_for_dish(
        &self,
        dish: &Dish,
        catalog: &dyn IngredientCatalog,
    ) -> Result<PlanSet, AdmissionError> {
        let mut positions = Vec::with_capacity(dish.ingredients.len());
        for ingredient in &dish.ingredients {
            match catalog.position_of(ingredient) {
                Some(position) => positions.push(position),
                None => warn!(dish = %dish.name, %ingredient, "ingredient not in warehouse"),
            }
        }
        if positions.is_empty() {
            return Err(AdmissionError::PlanningFailed(format!(
                "no ingredient of `{}` could be located",
                dish.name
            )));
        }
        let set = Self::plan(&positions, self.start)?;
        if let Some(best) = set.best() {
            debug!(dish = %dish.name, policy = %best.policy, cost = best.total_cost, "retrieval planned");
        }
        Ok(set)
    }
}

fn shortest_seek_first(positions: &[Position], start: Position) -> Vec<Position> {
    let mut remaining = positions.to_vec();
    let mut route = Vec::with_capacity(remaining.len());
    let mut current = start;
    while !remaining.is_empty() {
        let index = remaining
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| (current.abs_diff(**p), **p))
            .map_or(0, |(i, _)| i);
        current = remaining.swap_remove(index);
        route.push(current);
    }
    route
}

fn directional_sweep(positions: &[Position], start: Position) -> Vec<Position> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    let split = sorted.partition_point(|p| *p < start);
    let (below, above) = sorted.split_at(split);
    above.iter().chain(below.iter().rev()).copied().collect()
}
