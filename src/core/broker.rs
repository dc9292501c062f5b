use crate::core::db;
use crate::core::error::PipelineError;
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

/// The DB Broker is the single path to the pipeline store.
///
/// Mutations that read an idea and then write it back run under a per-idea
/// lock so two requests for the same idea cannot both act on a stale state.
/// Requests for different ideas proceed independently.
pub struct DbBroker {
    db_path: PathBuf,
}

static IDEA_LOCKS: LazyLock<Mutex<FxHashMap<String, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

fn poisoned(what: &str) -> PipelineError {
    PipelineError::PersistenceError(format!("{} lock poisoned", what))
}

impl DbBroker {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Execute a closure with a fresh, schema-checked connection.
    pub fn with_conn<F, R>(&self, op_name: &str, f: F) -> Result<R, PipelineError>
    where
        F: FnOnce(&Connection) -> Result<R, PipelineError>,
    {
        let conn = db::db_connect(&self.db_path.to_string_lossy())?;
        db::ensure_schema(&conn)?;

        let result = f(&conn);
        match &result {
            Ok(_) => tracing::debug!(op = op_name, status = "success", "broker op"),
            Err(err) => tracing::debug!(op = op_name, status = "error", error = %err, "broker op"),
        }
        result
    }

    /// Like [`DbBroker::with_conn`], serialized against every other call for the same idea.
    pub fn with_idea_lock<F, R>(&self, idea_id: &str, op_name: &str, f: F) -> Result<R, PipelineError>
    where
        F: FnOnce(&Connection) -> Result<R, PipelineError>,
    {
        let key = format!("{}::{}", self.db_path.display(), idea_id);
        let slot = {
            let mut locks = IDEA_LOCKS.lock().map_err(|_| poisoned("idea lock table"))?;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = slot.lock().map_err(|_| poisoned("idea"))?;
            self.with_conn(op_name, f)
        };

        // Drop the slot once nobody else is queued on it.
        if let Ok(mut locks) = IDEA_LOCKS.lock() {
            if Arc::strong_count(&slot) == 2 {
                locks.remove(&key);
            }
        }
        result
    }
}
