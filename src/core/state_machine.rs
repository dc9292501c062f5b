//! Idea lifecycle states and the allowed-transition table.
//!
//! The table in [`allowed_transitions`] is the only authority on which state
//! changes are legal. Everything that mutates an idea's state goes through
//! [`can_transition`] first. Transitions are forward-only; `rejected` and
//! `protected_published` are terminal.

use crate::core::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaState {
    IdeaSubmitted,
    AiRefined,
    TeamFormed,
    PrototypeReady,
    AiJudged,
    HumanJudged,
    ApprovedForExecution,
    ExecutionInProgress,
    ImpactTracking,
    ProtectedPublished,
    Rejected,
}

impl IdeaState {
    pub const ALL: [IdeaState; 11] = [
        IdeaState::IdeaSubmitted,
        IdeaState::AiRefined,
        IdeaState::TeamFormed,
        IdeaState::PrototypeReady,
        IdeaState::AiJudged,
        IdeaState::HumanJudged,
        IdeaState::ApprovedForExecution,
        IdeaState::ExecutionInProgress,
        IdeaState::ImpactTracking,
        IdeaState::ProtectedPublished,
        IdeaState::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IdeaState::IdeaSubmitted => "idea_submitted",
            IdeaState::AiRefined => "ai_refined",
            IdeaState::TeamFormed => "team_formed",
            IdeaState::PrototypeReady => "prototype_ready",
            IdeaState::AiJudged => "ai_judged",
            IdeaState::HumanJudged => "human_judged",
            IdeaState::ApprovedForExecution => "approved_for_execution",
            IdeaState::ExecutionInProgress => "execution_in_progress",
            IdeaState::ImpactTracking => "impact_tracking",
            IdeaState::ProtectedPublished => "protected_published",
            IdeaState::Rejected => "rejected",
        }
    }

    /// Non-strict: an idea that was rejected is never "at or past" a later stage.
    pub fn is_at_or_past(self, stage: IdeaState) -> bool {
        self != IdeaState::Rejected && stage != IdeaState::Rejected && self >= stage
    }
}

impl fmt::Display for IdeaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdeaState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdeaState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| PipelineError::ValidationError(format!("unknown idea state '{}'", s)))
    }
}

pub fn allowed_transitions(from: IdeaState) -> &'static [IdeaState] {
    use IdeaState::*;
    match from {
        IdeaSubmitted => &[AiRefined, Rejected],
        AiRefined => &[TeamFormed, Rejected],
        TeamFormed => &[PrototypeReady, Rejected],
        PrototypeReady => &[AiJudged, Rejected],
        AiJudged => &[HumanJudged, Rejected],
        HumanJudged => &[ApprovedForExecution, Rejected],
        ApprovedForExecution => &[ExecutionInProgress],
        ExecutionInProgress => &[ImpactTracking],
        ImpactTracking => &[ProtectedPublished],
        ProtectedPublished => &[],
        Rejected => &[],
    }
}

pub fn can_transition(from: IdeaState, to: IdeaState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// String-level guard for untyped callers. Unknown names on either side are refused.
pub fn can_transition_str(from: &str, to: &str) -> bool {
    match (from.parse::<IdeaState>(), to.parse::<IdeaState>()) {
        (Ok(from), Ok(to)) => can_transition(from, to),
        _ => false,
    }
}

/// UI hint only. Never use this to authorize a transition.
pub fn next_suggested(state: IdeaState) -> Option<IdeaState> {
    allowed_transitions(state).first().copied()
}

pub fn is_terminal(state: IdeaState) -> bool {
    allowed_transitions(state).is_empty()
}
