use crate::core::error;
use crate::core::schemas;
use crate::core::state_machine::IdeaState;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::PipelineError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn pipeline_db_path(root: &Path) -> PathBuf {
    root.join(schemas::PIPELINE_DB_NAME)
}

/// Idempotent: creates missing tables and stamps the schema version.
pub fn ensure_schema(conn: &Connection) -> Result<(), error::PipelineError> {
    conn.execute(schemas::SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::PIPELINE_SCHEMA_VERSION {
        return Ok(());
    }

    for ddl in schemas::PIPELINE_SCHEMA {
        conn.execute(ddl, [])?;
    }

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::PIPELINE_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

pub fn initialize_pipeline_db(root: &Path) -> Result<PathBuf, error::PipelineError> {
    fs::create_dir_all(root)?;
    let db_path = pipeline_db_path(root);
    let conn = db_connect(&db_path.to_string_lossy())?;
    ensure_schema(&conn)?;
    tracing::debug!(path = %db_path.display(), "pipeline database ready");
    Ok(db_path)
}

impl ToSql for IdeaState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// A stored state that no longer parses is corruption, surfaced as a column error.
impl FromSql for IdeaState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<IdeaState>()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
