//! Traits at the seams between the admission core and the world around it.

use std::future::Future;

use async_trait::async_trait;

use crate::core::error::PersistError;
use crate::core::model::{Order, Worker};
use crate::util::serde::Position;

/// Abstraction for spawning processing tasks.
pub trait Spawn: Send + Sync + 'static {
    /// Spawn a future onto the runtime.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Ingredient-to-location lookups for the warehouse path planner.
pub trait IngredientCatalog: Send + Sync {
    /// Warehouse position of `ingredient`, if stocked.
    fn position_of(&self, ingredient: &str) -> Option<Position>;

    /// Ingredient stored at `position`, if any.
    fn ingredient_at(&self, position: Position) -> Option<String>;
}

/// Catalog with nothing in it. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl IngredientCatalog for EmptyCatalog {
    fn position_of(&self, _ingredient: &str) -> Option<Position> {
        None
    }

    fn ingredient_at(&self, _position: Position) -> Option<String> {
        None
    }
}

/// Receives worker and order state after every grant, rollback and release.
///
/// Calls are made outside every lock and under a timeout; a slow or failing
/// recorder never blocks admission. A [`PersistError::Conflict`] returned for
/// a fresh grant makes the coordinator undo that grant.
#[async_trait]
pub trait StateRecorder: Send + Sync {
    /// Persist a worker's state.
    ///
    /// # Errors
    ///
    /// `Conflict` if a record with the same or newer version already exists.
    async fn record_worker(&self, worker: &Worker) -> Result<(), PersistError>;

    /// Persist an order's state.
    ///
    /// # Errors
    ///
    /// Backend specific.
    async fn record_order(&self, order: &Order) -> Result<(), PersistError>;
}
