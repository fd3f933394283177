//! In-memory ingredient catalog.

use std::collections::HashMap;

use crate::core::IngredientCatalog;
use crate::util::serde::Position;

/// Warehouse layout held in a map, with reverse lookup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    positions: HashMap<String, Position>,
}

impl InMemoryCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or move an ingredient.
    #[must_use]
    pub fn with_ingredient(mut self, name: impl Into<String>, position: Position) -> Self {
        self.insert(name, position);
        self
    }

    /// Add or move an ingredient in place.
    pub fn insert(&mut self, name: impl Into<String>, position: Position) {
        self.positions.insert(name.into(), position);
    }

    /// Number of stocked ingredients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether nothing is stocked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The kitchen's stock warehouse.
    #[must_use]
    pub fn standard_warehouse() -> Self {
        [
            ("bun", 10),
            ("lettuce", 25),
            ("cheese", 5),
            ("onion", 30),
            ("pickle", 15),
            ("sauce", 20),
            ("beef_patty", 8),
            ("ham", 40),
            ("fried_egg", 56),
            ("chicken", 34),
            ("starch", 60),
        ]
        .into_iter()
        .fold(Self::new(), |catalog, (name, position)| catalog.with_ingredient(name, position))
    }
}

impl IngredientCatalog for InMemoryCatalog {
    fn position_of(&self, ingredient: &str) -> Option<Position> {
        self.positions.get(ingredient).copied()
    }

    fn ingredient_at(&self, position: Position) -> Option<String> {
        self.positions
            .iter()
            .filter(|(_, p)| **p == position)
            .map(|(name, _)| name.clone())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dish, PlanPolicy, WarehousePathPlanner};

    #[test]
    fn test_standard_warehouse_lookups() {
        let catalog = InMemoryCatalog::standard_warehouse();
        assert_eq!(catalog.len(), 11);
        assert_eq!(catalog.position_of("bun"), Some(10));
        assert_eq!(catalog.ingredient_at(56).as_deref(), Some("fried_egg"));
        assert_eq!(catalog.position_of("truffle"), None);
    }

    #[test]
    fn test_every_menu_dish_is_plannable() {
        let catalog = InMemoryCatalog::standard_warehouse();
        let planner = WarehousePathPlanner::new(0);
        for dish in Dish::standard_menu() {
            let set = planner.plan_for_dish(&dish, &catalog).unwrap();
            assert_eq!(set.plans.len(), 3);
        }
    }

    #[test]
    fn test_chicken_nuggets_route() {
        let catalog = InMemoryCatalog::standard_warehouse();
        let nuggets = Dish::standard_menu().remove(4);
        let set = WarehousePathPlanner::new(0).plan_for_dish(&nuggets, &catalog).unwrap();
        let sweep = set.get(PlanPolicy::DirectionalSweep).unwrap();
        assert_eq!(sweep.order, vec![20, 34, 60]);
        assert_eq!(
            sweep.describe_steps(&catalog),
            vec![
                "0 → 20 (sauce) dist=20",
                "20 → 34 (chicken) dist=14",
                "34 → 60 (starch) dist=26"
            ]
        );
    }
}
