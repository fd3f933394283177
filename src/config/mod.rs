//! Configuration models for the kitchen pools and timings.

pub mod kitchen;

pub use kitchen::{KitchenConfig, ToolInventory};
