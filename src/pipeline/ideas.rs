use crate::core::error::PipelineError;
use crate::core::state_machine::IdeaState;
use crate::core::time::new_id;
use crate::pipeline::PipelineContext;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

pub const ACTION_SUBMITTED: &str = "IDEA_SUBMITTED";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Idea {
    pub id: String,
    pub title: String,
    pub description: String,
    pub state: IdeaState,
    /// Cached projection of the latest AI batch score.
    pub latest_ai_score: Option<f64>,
    /// Cached projection of the aggregated human score.
    pub final_judging_score: Option<f64>,
    pub owner_id: String,
    pub owner_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewIdea {
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub owner_name: String,
}

/// One immutable row of an idea's history. `from_state` is `None` only for creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub event_id: String,
    pub idea_id: String,
    pub from_state: Option<IdeaState>,
    pub to_state: IdeaState,
    pub action: String,
    pub notes: Option<String>,
    pub actor_id: String,
    pub actor_role: String,
    pub created_at: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StageDuration {
    pub state: IdeaState,
    pub entered_at: i64,
    pub duration_secs: i64,
    /// True for the final stage, measured up to "now".
    pub open: bool,
}

const IDEA_COLUMNS: &str = "id, title, description, state, latest_ai_score, final_judging_score, owner_id, owner_name, created_at, updated_at";
const EVENT_COLUMNS: &str =
    "event_id, idea_id, from_state, to_state, action, notes, actor_id, actor_role, created_at";

fn idea_from_row(row: &Row<'_>) -> rusqlite::Result<Idea> {
    Ok(Idea {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        state: row.get(3)?,
        latest_ai_score: row.get(4)?,
        final_judging_score: row.get(5)?,
        owner_id: row.get(6)?,
        owner_name: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<LifecycleEvent> {
    Ok(LifecycleEvent {
        event_id: row.get(0)?,
        idea_id: row.get(1)?,
        from_state: row.get(2)?,
        to_state: row.get(3)?,
        action: row.get(4)?,
        notes: row.get(5)?,
        actor_id: row.get(6)?,
        actor_role: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub(crate) fn find_idea(conn: &Connection, id: &str) -> Result<Option<Idea>, PipelineError> {
    let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], idea_from_row).optional()?)
}

pub(crate) fn load_idea(conn: &Connection, id: &str) -> Result<Idea, PipelineError> {
    find_idea(conn, id)?.ok_or_else(|| PipelineError::NotFound(format!("idea '{}'", id)))
}

pub(crate) fn insert_event(conn: &Connection, ev: &LifecycleEvent) -> Result<(), PipelineError> {
    conn.execute(
        "INSERT INTO lifecycle_events(event_id, idea_id, from_state, to_state, action, notes, actor_id, actor_role, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            ev.event_id,
            ev.idea_id,
            ev.from_state,
            ev.to_state,
            ev.action,
            ev.notes,
            ev.actor_id,
            ev.actor_role,
            ev.created_at
        ],
    )?;
    Ok(())
}

pub(crate) fn load_events(conn: &Connection, idea_id: &str) -> Result<Vec<LifecycleEvent>, PipelineError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM lifecycle_events WHERE idea_id = ?1 ORDER BY created_at, seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![idea_id], event_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn submit_idea(ctx: &PipelineContext, new: NewIdea) -> Result<Idea, PipelineError> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(PipelineError::ValidationError(
            "idea title cannot be empty".to_string(),
        ));
    }
    if new.owner_id.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "idea owner_id cannot be empty".to_string(),
        ));
    }

    let now = ctx.now();
    let idea = Idea {
        id: new_id(),
        title: title.to_string(),
        description: new.description,
        state: IdeaState::IdeaSubmitted,
        latest_ai_score: None,
        final_judging_score: None,
        owner_id: new.owner_id,
        owner_name: new.owner_name,
        created_at: now,
        updated_at: now,
    };
    let event = LifecycleEvent {
        event_id: new_id(),
        idea_id: idea.id.clone(),
        from_state: None,
        to_state: IdeaState::IdeaSubmitted,
        action: ACTION_SUBMITTED.to_string(),
        notes: None,
        actor_id: idea.owner_id.clone(),
        actor_role: "submitter".to_string(),
        created_at: now,
    };

    ctx.store.broker().with_conn("idea.submit", |conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO ideas(id, title, description, state, latest_ai_score, final_judging_score, owner_id, owner_name, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, NULL, NULL, ?5, ?6, ?7, ?8)",
            params![
                idea.id,
                idea.title,
                idea.description,
                idea.state,
                idea.owner_id,
                idea.owner_name,
                idea.created_at,
                idea.updated_at
            ],
        )?;
        insert_event(&tx, &event)?;
        tx.commit()?;
        Ok(())
    })?;

    ctx.audit(
        &idea.owner_id,
        ACTION_SUBMITTED,
        "idea",
        &idea.id,
        serde_json::json!({ "title": idea.title, "state": idea.state }),
    );
    tracing::info!(idea_id = %idea.id, "idea submitted");
    Ok(idea)
}

pub fn get_idea(ctx: &PipelineContext, id: &str) -> Result<Idea, PipelineError> {
    ctx.store
        .broker()
        .with_conn("idea.get", |conn| load_idea(conn, id))
}

pub fn list_ideas(
    ctx: &PipelineContext,
    state: Option<IdeaState>,
) -> Result<Vec<Idea>, PipelineError> {
    ctx.store.broker().with_conn("idea.list", |conn| {
        let mut out = Vec::new();
        match state {
            Some(state) => {
                let sql = format!(
                    "SELECT {IDEA_COLUMNS} FROM ideas WHERE state = ?1 ORDER BY created_at, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                for r in stmt.query_map(params![state], idea_from_row)? {
                    out.push(r?);
                }
            }
            None => {
                let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas ORDER BY created_at, id");
                let mut stmt = conn.prepare(&sql)?;
                for r in stmt.query_map([], idea_from_row)? {
                    out.push(r?);
                }
            }
        }
        Ok(out)
    })
}

/// Full ordered history of an idea, creation first.
pub fn lifecycle_history(
    ctx: &PipelineContext,
    idea_id: &str,
) -> Result<Vec<LifecycleEvent>, PipelineError> {
    ctx.store.broker().with_conn("idea.history", |conn| {
        load_idea(conn, idea_id)?;
        load_events(conn, idea_id)
    })
}

/// Time spent in each stage: the gap to the next event, or to `now` for the last one.
pub fn stage_durations(events: &[LifecycleEvent], now: i64) -> Vec<StageDuration> {
    events
        .iter()
        .enumerate()
        .map(|(i, ev)| {
            let (end, open) = match events.get(i + 1) {
                Some(next) => (next.created_at, false),
                None => (now, true),
            };
            StageDuration {
                state: ev.to_state,
                entered_at: ev.created_at,
                duration_secs: (end - ev.created_at).max(0),
                open,
            }
        })
        .collect()
}
