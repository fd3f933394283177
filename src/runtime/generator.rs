//! Random order producer.
//!
//! Draws dishes from the standard menu with a priority in `1..=5` and stamps
//! each order with the current time. Seeded, so a given seed always yields
//! the same dishes and priorities.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::core::{Dish, KitchenContext, Order};
use crate::runtime::api::{submit_batch, BatchReceipt};
use crate::util::serde::{OrderId, PriorityLevel};

/// Lowest generated priority.
pub const MIN_PRIORITY: PriorityLevel = 1;
/// Highest generated priority.
pub const MAX_PRIORITY: PriorityLevel = 5;

/// Produces batches of random orders with increasing ids.
#[derive(Debug)]
pub struct OrderGenerator {
    rng: StdRng,
    menu: Vec<Arc<Dish>>,
    next_id: OrderId,
}

impl OrderGenerator {
    /// Generator over the standard menu, numbering orders from 1.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_menu(seed, Dish::standard_menu().into_iter().map(Arc::new).collect())
    }

    /// Generator over a custom menu. An empty menu yields no orders.
    #[must_use]
    pub fn with_menu(seed: u64, menu: Vec<Arc<Dish>>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            menu,
            next_id: 1,
        }
    }

    /// Start numbering at `first_id`.
    #[must_use]
    pub const fn starting_at(mut self, first_id: OrderId) -> Self {
        self.next_id = first_id;
        self
    }

    /// Build `count` orders without submitting them.
    pub fn generate(&mut self, count: usize) -> Vec<Order> {
        if self.menu.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| {
                let dish = Arc::clone(&self.menu[self.rng.random_range(0..self.menu.len())]);
                let priority = self.rng.random_range(MIN_PRIORITY..=MAX_PRIORITY);
                let order = Order::new(self.next_id, dish, priority);
                self.next_id += 1;
                order
            })
            .collect()
    }

    /// Build `count` orders and submit them as one batch.
    pub fn submit_to(&mut self, ctx: &KitchenContext, count: usize) -> BatchReceipt {
        let orders = self.generate(count);
        debug!(count = orders.len(), "generated order batch");
        submit_batch(ctx, orders)
    }
}
