//! Execution project provisioning.
//!
//! Provisioning is a get-or-create keyed on the idea: `projects.idea_id` is
//! UNIQUE, so a second call can never create a second project no matter how
//! it races. The project row and its starter content are written in one
//! transaction. A project found without starter content (written by an older
//! or interrupted run) is completed rather than left as an empty shell.

use crate::core::error::PipelineError;
use crate::core::state_machine::IdeaState;
use crate::core::time::{SECS_PER_DAY, new_id};
use crate::pipeline::PipelineContext;
use crate::pipeline::ideas;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

pub const ACTION_PROJECT_AUTO_CREATED: &str = "PROJECT_AUTO_CREATED";
pub const ACTION_PROJECT_COMPLETED: &str = "PROJECT_STARTER_CONTENT_COMPLETED";

pub const PROJECT_STATUS_PLANNED: &str = "planned";
pub const TASK_STATUS_TODO: &str = "todo";

const STARTER_TASKS: [&str; 3] = [
    "Kick-off: confirm scope, owners and success metrics",
    "Pilot build and integration with existing workflow",
    "Pilot review and rollout decision",
];

struct RiskSeed {
    title: &'static str,
    severity: &'static str,
    mitigation: &'static str,
}

const STARTER_RISKS: [RiskSeed; 2] = [
    RiskSeed {
        title: "User adoption slower than planned",
        severity: "medium",
        mitigation: "Run onboarding sessions and collect feedback from pilot users early",
    },
    RiskSeed {
        title: "Integration with existing systems",
        severity: "high",
        mitigation: "Schedule an integration spike with system owners in the first month",
    },
];

struct KpiSeed {
    name: &'static str,
    unit: &'static str,
    baseline: f64,
    target: f64,
}

const STARTER_KPIS: [KpiSeed; 2] = [
    KpiSeed {
        name: "Process time reduction",
        unit: "index",
        baseline: 100.0,
        target: 75.0,
    },
    KpiSeed {
        name: "Internal satisfaction",
        unit: "score",
        baseline: 60.0,
        target: 85.0,
    },
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub idea_id: String,
    pub name: String,
    pub pm_name: String,
    pub status: String,
    pub progress: i64,
    pub start_at: i64,
    pub end_at: i64,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectTask {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub status: String,
    pub due_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectRisk {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub severity: String,
    pub mitigation: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectKpi {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub unit: String,
    pub baseline: f64,
    pub target: f64,
    pub current: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProjectBundle {
    pub project: Project,
    pub tasks: Vec<ProjectTask>,
    pub risks: Vec<ProjectRisk>,
    pub kpis: Vec<ProjectKpi>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProvisionOutcome {
    pub project_id: String,
    /// A new project row was inserted by this call.
    pub created: bool,
    /// Missing starter content was filled in on an existing project.
    pub completed_existing: bool,
}

fn count(conn: &Connection, table: &str, project_id: &str) -> Result<i64, PipelineError> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE project_id = ?1");
    Ok(conn.query_row(&sql, params![project_id], |r| r.get(0))?)
}

/// Inserts any starter group that is entirely absent. Returns whether anything was written.
fn seed_starter_content(
    ctx: &PipelineContext,
    conn: &Connection,
    project_id: &str,
    start_at: i64,
) -> Result<bool, PipelineError> {
    let mut wrote = false;

    if count(conn, "project_tasks", project_id)? == 0 {
        let offsets = &ctx.config.provisioning.task_offsets_days;
        for (position, (title, offset)) in STARTER_TASKS.iter().zip(offsets.iter()).enumerate() {
            conn.execute(
                "INSERT INTO project_tasks(id, project_id, title, status, due_at, position)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new_id(),
                    project_id,
                    title,
                    TASK_STATUS_TODO,
                    start_at + offset * SECS_PER_DAY,
                    position as i64
                ],
            )?;
        }
        wrote = true;
    }

    if count(conn, "project_risks", project_id)? == 0 {
        for (position, risk) in STARTER_RISKS.iter().enumerate() {
            conn.execute(
                "INSERT INTO project_risks(id, project_id, title, severity, mitigation, position)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new_id(),
                    project_id,
                    risk.title,
                    risk.severity,
                    risk.mitigation,
                    position as i64
                ],
            )?;
        }
        wrote = true;
    }

    if count(conn, "project_kpis", project_id)? == 0 {
        for (position, kpi) in STARTER_KPIS.iter().enumerate() {
            conn.execute(
                "INSERT INTO project_kpis(id, project_id, name, unit, baseline, target, current, position)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new_id(),
                    project_id,
                    kpi.name,
                    kpi.unit,
                    kpi.baseline,
                    kpi.target,
                    kpi.baseline,
                    position as i64
                ],
            )?;
        }
        wrote = true;
    }

    Ok(wrote)
}

/// Caller must hold the idea lock for `idea_id`.
pub(crate) fn provision_locked(
    ctx: &PipelineContext,
    conn: &Connection,
    idea_id: &str,
    idea_title: &str,
    pm_name: Option<&str>,
) -> Result<ProvisionOutcome, PipelineError> {
    let now = ctx.now();
    let pm_name = pm_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ctx.config.provisioning.default_pm_name.as_str());
    let end_at = ctx
        .config
        .provisioning
        .window_days
        .checked_mul(SECS_PER_DAY)
        .and_then(|window| now.checked_add(window))
        .ok_or_else(|| {
            PipelineError::ValidationError(format!(
                "provisioning window of {} days is out of range",
                ctx.config.provisioning.window_days
            ))
        })?;

    let tx = conn.unchecked_transaction()?;
    let inserted = tx.execute(
        "INSERT INTO projects(id, idea_id, name, pm_name, status, progress, start_at, end_at, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?6)
         ON CONFLICT(idea_id) DO NOTHING",
        params![
            new_id(),
            idea_id,
            idea_title,
            pm_name,
            PROJECT_STATUS_PLANNED,
            now,
            end_at
        ],
    )?;
    let (project_id, start_at): (String, i64) = tx.query_row(
        "SELECT id, start_at FROM projects WHERE idea_id = ?1",
        params![idea_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let seeded = seed_starter_content(ctx, &tx, &project_id, start_at)?;
    tx.commit()?;

    let created = inserted == 1;
    let completed_existing = !created && seeded;
    if created || completed_existing {
        let action = if created {
            ACTION_PROJECT_AUTO_CREATED
        } else {
            ACTION_PROJECT_COMPLETED
        };
        ctx.audit(
            "system",
            action,
            "project",
            &project_id,
            serde_json::json!({ "idea_id": idea_id, "pm_name": pm_name }),
        );
        tracing::info!(idea_id, project_id = %project_id, action, "project provisioned");
    } else {
        tracing::debug!(idea_id, project_id = %project_id, "project already provisioned");
    }

    Ok(ProvisionOutcome {
        project_id,
        created,
        completed_existing,
    })
}

/// Get-or-create the execution project for an approved idea. Safe to retry.
pub fn provision_project(
    ctx: &PipelineContext,
    idea_id: &str,
    pm_name: Option<&str>,
) -> Result<ProvisionOutcome, PipelineError> {
    ctx.store
        .broker()
        .with_idea_lock(idea_id, "project.provision", |conn| {
            let idea = ideas::load_idea(conn, idea_id)?;
            if !idea.state.is_at_or_past(IdeaState::ApprovedForExecution) {
                return Err(PipelineError::ValidationError(format!(
                    "idea '{}' is {} and has not been approved for execution",
                    idea.id, idea.state
                )));
            }
            provision_locked(ctx, conn, &idea.id, &idea.title, pm_name).map_err(|err| {
                if err.is_persistence() {
                    PipelineError::ProvisioningError {
                        idea_id: idea.id.clone(),
                        reason: err.to_string(),
                    }
                } else {
                    err
                }
            })
        })
}

pub(crate) fn find_project(conn: &Connection, idea_id: &str) -> Result<Option<Project>, PipelineError> {
    Ok(conn
        .query_row(
            "SELECT id, idea_id, name, pm_name, status, progress, start_at, end_at, created_at
             FROM projects WHERE idea_id = ?1",
            params![idea_id],
            |r| {
                Ok(Project {
                    id: r.get(0)?,
                    idea_id: r.get(1)?,
                    name: r.get(2)?,
                    pm_name: r.get(3)?,
                    status: r.get(4)?,
                    progress: r.get(5)?,
                    start_at: r.get(6)?,
                    end_at: r.get(7)?,
                    created_at: r.get(8)?,
                })
            },
        )
        .optional()?)
}

pub fn get_project(
    ctx: &PipelineContext,
    idea_id: &str,
) -> Result<Option<ProjectBundle>, PipelineError> {
    ctx.store.broker().with_conn("project.get", |conn| {
        let Some(project) = find_project(conn, idea_id)? else {
            return Ok(None);
        };

        let mut tasks = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, status, due_at FROM project_tasks
             WHERE project_id = ?1 ORDER BY position",
        )?;
        for r in stmt.query_map(params![project.id], |r| {
            Ok(ProjectTask {
                id: r.get(0)?,
                project_id: r.get(1)?,
                title: r.get(2)?,
                status: r.get(3)?,
                due_at: r.get(4)?,
            })
        })? {
            tasks.push(r?);
        }

        let mut risks = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, severity, mitigation FROM project_risks
             WHERE project_id = ?1 ORDER BY position",
        )?;
        for r in stmt.query_map(params![project.id], |r| {
            Ok(ProjectRisk {
                id: r.get(0)?,
                project_id: r.get(1)?,
                title: r.get(2)?,
                severity: r.get(3)?,
                mitigation: r.get(4)?,
            })
        })? {
            risks.push(r?);
        }

        let mut kpis = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, unit, baseline, target, current FROM project_kpis
             WHERE project_id = ?1 ORDER BY position",
        )?;
        for r in stmt.query_map(params![project.id], |r| {
            Ok(ProjectKpi {
                id: r.get(0)?,
                project_id: r.get(1)?,
                name: r.get(2)?,
                unit: r.get(3)?,
                baseline: r.get(4)?,
                target: r.get(5)?,
                current: r.get(6)?,
            })
        })? {
            kpis.push(r?);
        }

        Ok(Some(ProjectBundle {
            project,
            tasks,
            risks,
            kpis,
        }))
    })
}

/// Projects missing any group of starter content.
pub(crate) fn incomplete_projects(conn: &Connection) -> Result<Vec<Project>, PipelineError> {
    let mut stmt = conn.prepare("SELECT idea_id FROM projects ORDER BY created_at, id")?;
    let idea_ids: Vec<String> = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<_, _>>()?;
    let mut out = Vec::new();
    for idea_id in idea_ids {
        if let Some(project) = find_project(conn, &idea_id)? {
            let empty = count(conn, "project_tasks", &project.id)? == 0
                || count(conn, "project_risks", &project.id)? == 0
                || count(conn, "project_kpis", &project.id)? == 0;
            if empty {
                out.push(project);
            }
        }
    }
    Ok(out)
}
