//! Stateful lifecycle subsystems.
//!
//! Every operation here takes a [`PipelineContext`], which bundles the store
//! with the collaborators the core depends on but does not own: the clock,
//! the audit sink and the loaded configuration.

pub mod ideas;
pub mod judging;
pub mod provision;
pub mod reconcile;
pub mod transition;

use crate::core::audit::{self, AuditRecord, AuditSink, JsonlAuditSink};
use crate::core::config::{self, PipelineConfig};
use crate::core::db;
use crate::core::error::PipelineError;
use crate::core::store::Store;
use crate::core::time::{Clock, SystemClock};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

pub struct PipelineContext {
    pub store: Store,
    pub config: PipelineConfig,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
}

impl PipelineContext {
    /// Production wiring: SQLite store at `root`, `pipeline.toml`, system clock, JSONL audit log.
    pub fn open(root: &Path) -> Result<Self, PipelineError> {
        let config = config::load_config(root)?;
        let audit = Arc::new(JsonlAuditSink::new(root.join(&config.audit.log_file)));
        Self::with_parts(Store::new(root), config, Arc::new(SystemClock), audit)
    }

    pub fn with_parts(
        store: Store,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        db::initialize_pipeline_db(&store.root)?;
        Ok(Self {
            store,
            config,
            clock,
            audit,
        })
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Fire-and-forget audit write.
    pub(crate) fn audit(
        &self,
        actor: &str,
        action: &str,
        entity: &str,
        entity_id: &str,
        metadata: JsonValue,
    ) {
        let record = AuditRecord::new(self.now(), actor, action, entity, entity_id, metadata);
        audit::record_best_effort(self.audit.as_ref(), record);
    }
}
