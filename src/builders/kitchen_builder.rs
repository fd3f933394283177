//! Builder to assemble a kitchen from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::KitchenConfig;
use crate::core::{
    AdmissionError, AdmissionQueue, AuditSink, EmptyCatalog, InMemoryAuditSink, IngredientCatalog,
    KitchenContext, NoAging, PriorityAging, ResourceCoordinator, Spawn, StateRecorder,
};

/// Collects collaborators, then builds the context and its coordinator.
pub struct KitchenBuilder {
    config: KitchenConfig,
    catalog: Arc<dyn IngredientCatalog>,
    recorder: Option<Arc<dyn StateRecorder>>,
    audit: Option<Arc<dyn AuditSink>>,
    aging: Box<dyn PriorityAging>,
}

impl KitchenBuilder {
    /// Start from `config` with an empty catalog and no aging, persistence or audit.
    #[must_use]
    pub fn new(config: KitchenConfig) -> Self {
        Self {
            config,
            catalog: Arc::new(EmptyCatalog),
            recorder: None,
            audit: None,
            aging: Box::new(NoAging),
        }
    }

    /// Ingredient catalog for path planning.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn IngredientCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Persistence collaborator.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn StateRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Bounded in-memory audit sink sized from `audit_capacity`. Returns the
    /// sink so callers can inspect it.
    #[must_use]
    pub fn with_in_memory_audit(self) -> (Self, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::new(self.config.audit_capacity));
        let audit: Arc<dyn AuditSink> = sink.clone();
        (self.with_audit(audit), sink)
    }

    /// Priority aging hook applied on every reorder.
    #[must_use]
    pub fn with_aging(mut self, aging: Box<dyn PriorityAging>) -> Self {
        self.aging = aging;
        self
    }

    /// Validate the configuration and build the shared context.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when validation fails.
    pub fn build_context(self) -> Result<Arc<KitchenContext>, AdmissionError> {
        self.config.validate().map_err(AdmissionError::InvalidConfig)?;
        info!(
            workers = self.config.worker_count,
            workspace = self.config.workspace_capacity,
            ovens = self.config.tools.oven,
            fry_pans = self.config.tools.fry_pan,
            fry_pots = self.config.tools.fry_pot,
            "kitchen built"
        );
        Ok(Arc::new(KitchenContext::new(
            self.config,
            AdmissionQueue::with_aging(self.aging),
            self.catalog,
            self.recorder,
            self.audit,
        )))
    }

    /// Build the context and a coordinator that spawns through `spawner`.
    ///
    /// # Errors
    ///
    /// Same as [`KitchenBuilder::build_context`].
    pub fn build<S>(self, spawner: S) -> Result<ResourceCoordinator<S>, AdmissionError>
    where
        S: Spawn + Clone,
    {
        Ok(ResourceCoordinator::new(self.build_context()?, spawner))
    }
}
