//! Append-only audit sink.
//!
//! Audit is observability: callers go through [`record_best_effort`], which
//! logs and swallows sink failures so they never block the primary workflow.

use crate::core::error::PipelineError;
use crate::core::time::new_id;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub event_id: String,
    pub ts: i64,
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub metadata: JsonValue,
}

impl AuditRecord {
    pub fn new(
        ts: i64,
        actor: &str,
        action: &str,
        entity: &str,
        entity_id: &str,
        metadata: JsonValue,
    ) -> Self {
        Self {
            event_id: new_id(),
            ts,
            actor: actor.to_string(),
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id: entity_id.to_string(),
            metadata,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), PipelineError>;
}

/// One JSON object per line, appended.
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), PipelineError> {
        let line = serde_json::to_string(record)?;
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PipelineError::PersistenceError("audit log lock poisoned".to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn records_for(&self, entity_id: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.entity_id == entity_id)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), PipelineError> {
        self.records
            .lock()
            .map_err(|_| PipelineError::PersistenceError("audit buffer lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

pub fn record_best_effort(sink: &dyn AuditSink, record: AuditRecord) {
    if let Err(err) = sink.record(&record) {
        tracing::warn!(
            action = %record.action,
            entity = %record.entity,
            entity_id = %record.entity_id,
            error = %err,
            "audit write failed; continuing"
        );
    }
}

/// Reads a JSONL audit log back. Missing file means no records.
pub fn read_audit_log(path: &Path) -> Result<Vec<AuditRecord>, PipelineError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(PipelineError::from))
        .collect()
}
