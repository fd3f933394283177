//! Kitchen configuration: pool sizes, workspace capacity and timings.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;
use crate::core::model::ToolKind;
use crate::util::serde::Position;

/// Number of tools per category. Fixed for the lifetime of a kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolInventory {
    /// Ovens.
    pub oven: usize,
    /// Fry pans.
    pub fry_pan: usize,
    /// Deep fry pots.
    pub fry_pot: usize,
}

impl Default for ToolInventory {
    fn default() -> Self {
        Self {
            oven: 2,
            fry_pan: 1,
            fry_pot: 1,
        }
    }
}

impl ToolInventory {
    /// Tools of `kind`.
    #[must_use]
    pub const fn count(&self, kind: ToolKind) -> usize {
        match kind {
            ToolKind::Oven => self.oven,
            ToolKind::FryPan => self.fry_pan,
            ToolKind::FryPot => self.fry_pot,
        }
    }

    /// Tools across all categories.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.oven + self.fry_pan + self.fry_pot
    }
}

/// Root kitchen configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitchenConfig {
    /// Total workspace units.
    pub workspace_capacity: u32,
    /// Number of workers.
    pub worker_count: usize,
    /// Tool pool sizes.
    pub tools: ToolInventory,
    /// Wait after a deferred admission, in milliseconds.
    pub backoff_ms: u64,
    /// Maximum concurrent processing tasks; `None` means one per worker.
    pub max_in_flight: Option<usize>,
    /// Picker start position for path planning.
    pub planner_start: Position,
    /// Upper bound on a single persistence call, in milliseconds.
    pub persist_timeout_ms: u64,
    /// Audit events kept in memory.
    pub audit_capacity: usize,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            workspace_capacity: 100,
            worker_count: 2,
            tools: ToolInventory::default(),
            backoff_ms: 1000,
            max_in_flight: None,
            planner_start: 0,
            persist_timeout_ms: 500,
            audit_capacity: 1024,
        }
    }
}

impl KitchenConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.workspace_capacity == 0 {
            return Err("workspace_capacity must be greater than 0".into());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.backoff_ms == 0 {
            return Err("backoff_ms must be greater than 0".into());
        }
        if self.max_in_flight == Some(0) {
            return Err("max_in_flight must be greater than 0".into());
        }
        if self.persist_timeout_ms == 0 {
            return Err("persist_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `KITCHEN_*` environment variables, after loading
    /// a `.env` file if one is present.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a resulting invalid configuration.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        override_from_env(&mut cfg.workspace_capacity, "KITCHEN_WORKSPACE_CAPACITY")?;
        override_from_env(&mut cfg.worker_count, "KITCHEN_WORKER_COUNT")?;
        override_from_env(&mut cfg.tools.oven, "KITCHEN_OVENS")?;
        override_from_env(&mut cfg.tools.fry_pan, "KITCHEN_FRY_PANS")?;
        override_from_env(&mut cfg.tools.fry_pot, "KITCHEN_FRY_POTS")?;
        override_from_env(&mut cfg.backoff_ms, "KITCHEN_BACKOFF_MS")?;
        override_from_env(&mut cfg.planner_start, "KITCHEN_PLANNER_START")?;
        override_from_env(&mut cfg.persist_timeout_ms, "KITCHEN_PERSIST_TIMEOUT_MS")?;
        override_from_env(&mut cfg.audit_capacity, "KITCHEN_AUDIT_CAPACITY")?;
        if let Ok(raw) = std::env::var("KITCHEN_MAX_IN_FLIGHT") {
            cfg.max_in_flight = Some(parse_var(&raw, "KITCHEN_MAX_IN_FLIGHT")?);
        }
        cfg.validate().map_err(|e| anyhow!(e))?;
        Ok(cfg)
    }

    /// Processing concurrency bound.
    #[must_use]
    pub fn effective_max_in_flight(&self) -> usize {
        self.max_in_flight.unwrap_or(self.worker_count)
    }

    /// Backoff as a duration.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Persistence timeout as a duration.
    #[must_use]
    pub const fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

fn override_from_env<T>(slot: &mut T, key: &str) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = std::env::var(key) {
        *slot = parse_var(&raw, key)?;
    }
    Ok(())
}

fn parse_var<T>(raw: &str, key: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has invalid value `{raw}`"))
}
