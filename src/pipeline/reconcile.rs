//! Read-only integrity scan.
//!
//! Detects the partial-state conditions the write paths are built to avoid,
//! so they surface instead of being papered over. Nothing here repairs data;
//! projects can be completed with `provision_project`, scores rebuilt with
//! `recompute_scores`.

use crate::core::error::PipelineError;
use crate::core::state_machine::IdeaState;
use crate::pipeline::PipelineContext;
use crate::pipeline::ideas::{self, Idea};
use crate::pipeline::provision;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateDrift {
    pub idea_id: String,
    pub idea_state: IdeaState,
    /// `to_state` of the newest lifecycle event, `None` when the idea has no history at all.
    pub last_event_state: Option<IdeaState>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ReconcileReport {
    pub ideas_scanned: usize,
    pub state_drift: Vec<StateDrift>,
    /// Approved-or-later ideas with no execution project.
    pub missing_projects: Vec<String>,
    /// Project ids missing tasks, risks or KPIs.
    pub incomplete_projects: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.state_drift.is_empty()
            && self.missing_projects.is_empty()
            && self.incomplete_projects.is_empty()
    }
}

pub fn reconcile(ctx: &PipelineContext) -> Result<ReconcileReport, PipelineError> {
    let all: Vec<Idea> = ideas::list_ideas(ctx, None)?;

    ctx.store.broker().with_conn("reconcile", |conn| {
        let mut report = ReconcileReport {
            ideas_scanned: all.len(),
            ..Default::default()
        };

        for idea in &all {
            let last: Option<IdeaState> = conn
                .query_row(
                    "SELECT to_state FROM lifecycle_events WHERE idea_id = ?1
                     ORDER BY created_at DESC, seq DESC LIMIT 1",
                    params![idea.id],
                    |r| r.get(0),
                )
                .optional()?;
            if last != Some(idea.state) {
                tracing::warn!(
                    idea_id = %idea.id,
                    state = %idea.state,
                    last_event = ?last,
                    "idea state disagrees with its lifecycle history"
                );
                report.state_drift.push(StateDrift {
                    idea_id: idea.id.clone(),
                    idea_state: idea.state,
                    last_event_state: last,
                });
            }

            if idea.state.is_at_or_past(IdeaState::ApprovedForExecution)
                && provision::find_project(conn, &idea.id)?.is_none()
            {
                tracing::warn!(idea_id = %idea.id, state = %idea.state, "approved idea has no project");
                report.missing_projects.push(idea.id.clone());
            }
        }

        for project in provision::incomplete_projects(conn)? {
            tracing::warn!(project_id = %project.id, idea_id = %project.idea_id, "project missing starter content");
            report.incomplete_projects.push(project.id);
        }

        Ok(report)
    })
}
