//! Database schema definitions for the pipeline store.
//!
//! Everything lives in a single SQLite database (`pipeline.db`):
//! ideas and their lifecycle history, judging criteria and evaluations,
//! and the execution projects provisioned on approval.

pub const PIPELINE_DB_NAME: &str = "pipeline.db";
pub const PIPELINE_SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const SCHEMA_IDEAS: &str = "
    CREATE TABLE IF NOT EXISTS ideas (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        state TEXT NOT NULL,
        latest_ai_score REAL,
        final_judging_score REAL,
        owner_id TEXT NOT NULL,
        owner_name TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";
pub const SCHEMA_INDEX_IDEAS_STATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_ideas_state ON ideas(state)";

pub const SCHEMA_LIFECYCLE_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS lifecycle_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        idea_id TEXT NOT NULL,
        from_state TEXT,
        to_state TEXT NOT NULL,
        action TEXT NOT NULL,
        notes TEXT,
        actor_id TEXT NOT NULL,
        actor_role TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(idea_id) REFERENCES ideas(id)
    )
";
pub const SCHEMA_INDEX_EVENTS_IDEA: &str =
    "CREATE INDEX IF NOT EXISTS idx_lifecycle_events_idea ON lifecycle_events(idea_id, created_at)";

pub const SCHEMA_CRITERIA: &str = "
    CREATE TABLE IF NOT EXISTS judging_criteria (
        id TEXT PRIMARY KEY,
        label TEXT NOT NULL,
        weight REAL NOT NULL CHECK (weight > 0),
        created_at INTEGER NOT NULL
    )
";

pub const SCHEMA_EVALUATIONS: &str = "
    CREATE TABLE IF NOT EXISTS evaluations (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        batch_id TEXT NOT NULL,
        idea_id TEXT NOT NULL,
        evaluator_id TEXT NOT NULL,
        evaluator_name TEXT NOT NULL,
        evaluator_role TEXT NOT NULL,
        criterion_id TEXT NOT NULL,
        score REAL NOT NULL CHECK (score >= 0 AND score <= 100),
        comments TEXT,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(idea_id) REFERENCES ideas(id),
        FOREIGN KEY(criterion_id) REFERENCES judging_criteria(id)
    )
";
pub const SCHEMA_INDEX_EVALUATIONS_IDEA: &str =
    "CREATE INDEX IF NOT EXISTS idx_evaluations_idea ON evaluations(idea_id, evaluator_role)";

pub const SCHEMA_PROJECTS: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        idea_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        pm_name TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        start_at INTEGER NOT NULL,
        end_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(idea_id) REFERENCES ideas(id)
    )
";

pub const SCHEMA_PROJECT_TASKS: &str = "
    CREATE TABLE IF NOT EXISTS project_tasks (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        due_at INTEGER NOT NULL,
        position INTEGER NOT NULL,
        FOREIGN KEY(project_id) REFERENCES projects(id)
    )
";

pub const SCHEMA_PROJECT_RISKS: &str = "
    CREATE TABLE IF NOT EXISTS project_risks (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        title TEXT NOT NULL,
        severity TEXT NOT NULL,
        mitigation TEXT NOT NULL,
        position INTEGER NOT NULL,
        FOREIGN KEY(project_id) REFERENCES projects(id)
    )
";

pub const SCHEMA_PROJECT_KPIS: &str = "
    CREATE TABLE IF NOT EXISTS project_kpis (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        unit TEXT NOT NULL,
        baseline REAL NOT NULL,
        target REAL NOT NULL,
        current REAL NOT NULL,
        position INTEGER NOT NULL,
        FOREIGN KEY(project_id) REFERENCES projects(id)
    )
";

pub const SCHEMA_INDEX_TASKS_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_project_tasks_project ON project_tasks(project_id)";
pub const SCHEMA_INDEX_RISKS_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_project_risks_project ON project_risks(project_id)";
pub const SCHEMA_INDEX_KPIS_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_project_kpis_project ON project_kpis(project_id)";

/// Creation order matters for foreign keys.
pub const PIPELINE_SCHEMA: &[&str] = &[
    SCHEMA_IDEAS,
    SCHEMA_INDEX_IDEAS_STATE,
    SCHEMA_LIFECYCLE_EVENTS,
    SCHEMA_INDEX_EVENTS_IDEA,
    SCHEMA_CRITERIA,
    SCHEMA_EVALUATIONS,
    SCHEMA_INDEX_EVALUATIONS_IDEA,
    SCHEMA_PROJECTS,
    SCHEMA_PROJECT_TASKS,
    SCHEMA_PROJECT_RISKS,
    SCHEMA_PROJECT_KPIS,
    SCHEMA_INDEX_TASKS_PROJECT,
    SCHEMA_INDEX_RISKS_PROJECT,
    SCHEMA_INDEX_KPIS_PROJECT,
];
