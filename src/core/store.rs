//! Store handle for the pipeline's on-disk state.

use crate::core::broker::DbBroker;
use crate::core::db;
use std::path::{Path, PathBuf};

/// A Store is the directory holding `pipeline.db`, `pipeline.toml` and the audit log.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        db::pipeline_db_path(&self.root)
    }

    pub fn broker(&self) -> DbBroker {
        DbBroker::new(&self.db_path())
    }
}
