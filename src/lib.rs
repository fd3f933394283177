//! # Kitchen Admission
//!
//! Admission control for an automated kitchen.
//!
//! Orders need a worker (robot), a subset of shared tools (oven, fry pan,
//! fry pot) and a slice of shared workspace at the same time. This crate
//! decides, for every pending order, whether it can be granted all of that
//! right now, and if not, how it waits.
//!
//! ## Admission gate
//!
//! The [`core::ResourceCoordinator`] pulls one order at a time from the
//! [`core::AdmissionQueue`] (priority first, then age, then arrival) and runs
//! it through:
//!
//! 1. **Free worker**: first idle worker in id order.
//! 2. **Safety check**: a banker's-style dry run on copies of the pools. The
//!    grant must leave at least one busy worker able to finish.
//! 3. **Retrieval planning**: ingredient positions are resolved through an
//!    [`core::IngredientCatalog`] and planned under arrival-order,
//!    shortest-seek-first and directional-sweep policies.
//! 4. **Real allocation**: best-fit workspace first, then tools in a fixed
//!    category order. Any failure rolls back everything taken so far.
//!
//! Orders that fail a gate are requeued and the loop backs off. Granted
//! orders cook on a bounded processing pool and release everything when done,
//! even if the task is interrupted.
//!
//! ## Locking
//!
//! One pool lock guards tools and workspace; each worker has its own lock,
//! kept in a concurrent map. The pool lock is always taken first.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kitchen_admission::builders::KitchenBuilder;
//! use kitchen_admission::config::KitchenConfig;
//! use kitchen_admission::core::{Dish, Order};
//! use kitchen_admission::infra::InMemoryCatalog;
//! use kitchen_admission::runtime::{submit, TokioSpawner};
//!
//! let coordinator = KitchenBuilder::new(KitchenConfig::default())
//!     .with_catalog(Arc::new(InMemoryCatalog::standard_warehouse()))
//!     .build(TokioSpawner::current())?;
//! coordinator.start();
//!
//! let burger = Arc::new(Dish::standard_menu().remove(0));
//! submit(coordinator.context(), Order::new(1, burger, 5))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission-control core: model, pools, safety, planning and the loop.
pub mod core;
/// Configuration models for pools and timings.
pub mod config;
/// Builders to construct a kitchen from configuration.
pub mod builders;
/// In-memory adapters for the catalog and persistence collaborators.
pub mod infra;
/// Tokio spawner and in-process API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
