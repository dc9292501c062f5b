//! The transition engine: the sole sanctioned mutator of an idea's state.
//!
//! State update and lifecycle event are written in one SQLite transaction.
//! The update is conditional on the state we validated against, so a
//! concurrent writer from another process fails the whole operation rather
//! than silently winning. Audit is best-effort; provisioning is not.

use crate::core::error::PipelineError;
use crate::core::state_machine::{self, IdeaState};
use crate::core::time::new_id;
use crate::pipeline::PipelineContext;
use crate::pipeline::ideas::{self, LifecycleEvent};
use crate::pipeline::provision;
use rusqlite::{Connection, params};
use serde::Serialize;

pub const DEFAULT_ACTION: &str = "STATE_TRANSITION";

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub idea_id: String,
    pub to_state: IdeaState,
    pub actor_id: String,
    pub actor_role: String,
    pub notes: Option<String>,
    pub action: Option<String>,
    pub auto_create_project: bool,
    pub pm_name: Option<String>,
}

impl TransitionRequest {
    pub fn new(idea_id: &str, to_state: IdeaState, actor_id: &str, actor_role: &str) -> Self {
        Self {
            idea_id: idea_id.to_string(),
            to_state,
            actor_id: actor_id.to_string(),
            actor_role: actor_role.to_string(),
            notes: None,
            action: None,
            auto_create_project: false,
            pm_name: None,
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    /// Provision the execution project when this lands in `approved_for_execution`.
    pub fn with_auto_project(mut self, pm_name: Option<&str>) -> Self {
        self.auto_create_project = true;
        self.pm_name = pm_name.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransitionOutcome {
    pub idea_id: String,
    pub from_state: IdeaState,
    pub to_state: IdeaState,
    pub event_id: String,
    pub project_id: Option<String>,
}

pub fn apply_transition(
    ctx: &PipelineContext,
    req: &TransitionRequest,
) -> Result<TransitionOutcome, PipelineError> {
    ctx.store
        .broker()
        .with_idea_lock(&req.idea_id, "idea.transition", |conn| {
            apply_transition_locked(ctx, conn, req)
        })
}

/// Caller must hold the idea lock for `req.idea_id`.
pub(crate) fn apply_transition_locked(
    ctx: &PipelineContext,
    conn: &Connection,
    req: &TransitionRequest,
) -> Result<TransitionOutcome, PipelineError> {
    let idea = ideas::load_idea(conn, &req.idea_id)?;
    let from = idea.state;
    let to = req.to_state;
    if !state_machine::can_transition(from, to) {
        return Err(PipelineError::InvalidTransition { from, to });
    }

    let action = req.action.as_deref().unwrap_or(DEFAULT_ACTION);
    let event = LifecycleEvent {
        event_id: new_id(),
        idea_id: idea.id.clone(),
        from_state: Some(from),
        to_state: to,
        action: action.to_string(),
        notes: req.notes.clone(),
        actor_id: req.actor_id.clone(),
        actor_role: req.actor_role.clone(),
        created_at: ctx.now(),
    };

    let tx = conn.unchecked_transaction()?;
    // State only; no other idea column moves on this path.
    let changed = tx.execute(
        "UPDATE ideas SET state = ?1 WHERE id = ?2 AND state = ?3",
        params![to, idea.id, from],
    )?;
    if changed != 1 {
        return Err(PipelineError::PersistenceError(format!(
            "idea '{}' left state {} before the transition to {} committed",
            idea.id, from, to
        )));
    }
    ideas::insert_event(&tx, &event)?;
    tx.commit()?;

    tracing::info!(idea_id = %idea.id, from = %from, to = %to, action, "idea transitioned");

    ctx.audit(
        &req.actor_id,
        action,
        "idea",
        &idea.id,
        serde_json::json!({
            "from_state": from,
            "to_state": to,
            "actor_role": req.actor_role,
            "notes": req.notes,
            "event_id": event.event_id,
        }),
    );

    let mut outcome = TransitionOutcome {
        idea_id: idea.id.clone(),
        from_state: from,
        to_state: to,
        event_id: event.event_id,
        project_id: None,
    };

    if req.auto_create_project && to == IdeaState::ApprovedForExecution {
        let provisioned =
            provision::provision_locked(ctx, conn, &idea.id, &idea.title, req.pm_name.as_deref())
                .map_err(|err| match err {
                    err @ PipelineError::ProvisioningError { .. } => err,
                    other => PipelineError::ProvisioningError {
                        idea_id: idea.id.clone(),
                        reason: other.to_string(),
                    },
                })?;
        outcome.project_id = Some(provisioned.project_id);
    }

    Ok(outcome)
}
