//! Judging: criteria, evaluation intake, cached score projections and the
//! judging-driven transitions.
//!
//! AI and human submissions share one path. The evaluator role only selects
//! which rows feed the projection and which state the idea moves to:
//!
//! | role    | projection            | rows aggregated            | target state   |
//! |---------|-----------------------|----------------------------|----------------|
//! | `ai`    | `latest_ai_score`     | the submitted batch        | `ai_judged`    |
//! | `human` | `final_judging_score` | all human rows for the idea| `human_judged` |
//!
//! A transition is attempted only when the state machine allows it from the
//! idea's current state. When it does not, the score is still recorded and
//! the submission succeeds.

use crate::core::error::PipelineError;
use crate::core::scoring::{
    self, CriterionAverage, Evaluation, EvaluatorRole, EvaluatorScore, JudgingCriterion,
    RoleFilter,
};
use crate::core::state_machine::{self, IdeaState};
use crate::core::time::new_id;
use crate::pipeline::PipelineContext;
use crate::pipeline::ideas;
use crate::pipeline::transition::{self, TransitionOutcome, TransitionRequest};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

pub const ACTION_EVALUATION_SUBMITTED: &str = "EVALUATION_SUBMITTED";
pub const ACTION_AI_JUDGED: &str = "AI_PREJUDGING_COMPLETED";
pub const ACTION_HUMAN_JUDGED: &str = "HUMAN_JUDGING_COMPLETED";
pub const ACTION_CRITERION_ADDED: &str = "CRITERION_ADDED";

pub const AI_PREJUDGE_EVALUATOR_ID: &str = "ai-prejudge";
pub const AI_PREJUDGE_EVALUATOR_NAME: &str = "AI Pre-Judge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreInput {
    pub criterion_id: String,
    pub score: f64,
    #[serde(default)]
    pub comments: Option<String>,
}

impl ScoreInput {
    pub fn new(criterion_id: &str, score: f64) -> Self {
        Self {
            criterion_id: criterion_id.to_string(),
            score,
            comments: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationSubmission {
    pub idea_id: String,
    pub evaluator_id: String,
    pub evaluator_name: String,
    pub evaluator_role: EvaluatorRole,
    pub scores: Vec<ScoreInput>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubmissionOutcome {
    pub idea_id: String,
    pub batch_id: String,
    pub evaluator_role: EvaluatorRole,
    /// Weighted score of this batch alone.
    pub submission_score: f64,
    /// The projection stored on the idea after this submission, if the role has one.
    pub projected_score: Option<f64>,
    pub transition: Option<TransitionOutcome>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CriterionInsight {
    pub criterion_id: String,
    pub label: String,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JudgingSummary {
    pub idea_id: String,
    pub criteria: Vec<JudgingCriterion>,
    pub evaluations: Vec<Evaluation>,
    pub evaluator_scores: Vec<EvaluatorScore>,
    pub average_score: f64,
    pub strengths: Vec<CriterionInsight>,
    pub weaknesses: Vec<CriterionInsight>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreProjection {
    pub idea_id: String,
    pub latest_ai_score: Option<f64>,
    pub final_judging_score: Option<f64>,
}

// --- Criteria ---

fn criterion_from_row(row: &Row<'_>) -> rusqlite::Result<JudgingCriterion> {
    Ok(JudgingCriterion {
        id: row.get(0)?,
        label: row.get(1)?,
        weight: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub(crate) fn load_criteria(conn: &Connection) -> Result<Vec<JudgingCriterion>, PipelineError> {
    let mut stmt = conn.prepare(
        "SELECT id, label, weight, created_at FROM judging_criteria ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map([], criterion_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn add_criterion(
    ctx: &PipelineContext,
    id: Option<&str>,
    label: &str,
    weight: f64,
) -> Result<JudgingCriterion, PipelineError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(PipelineError::ValidationError(
            "criterion label cannot be empty".to_string(),
        ));
    }
    if !weight.is_finite() || weight <= 0.0 {
        return Err(PipelineError::ValidationError(format!(
            "criterion weight must be a positive number, got {}",
            weight
        )));
    }
    let criterion = JudgingCriterion {
        id: id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_id),
        label: label.to_string(),
        weight,
        created_at: ctx.now(),
    };

    ctx.store.broker().with_conn("criteria.add", |conn| {
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM judging_criteria WHERE id = ?1",
                params![criterion.id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(PipelineError::ValidationError(format!(
                "criterion '{}' already exists",
                criterion.id
            )));
        }
        conn.execute(
            "INSERT INTO judging_criteria(id, label, weight, created_at) VALUES(?1, ?2, ?3, ?4)",
            params![criterion.id, criterion.label, criterion.weight, criterion.created_at],
        )?;
        Ok(())
    })?;

    ctx.audit(
        "system",
        ACTION_CRITERION_ADDED,
        "criterion",
        &criterion.id,
        serde_json::json!({ "label": criterion.label, "weight": criterion.weight }),
    );
    Ok(criterion)
}

pub fn list_criteria(ctx: &PipelineContext) -> Result<Vec<JudgingCriterion>, PipelineError> {
    ctx.store.broker().with_conn("criteria.list", load_criteria)
}

// --- Evaluations ---

fn evaluation_from_row(row: &Row<'_>) -> rusqlite::Result<Evaluation> {
    let role: String = row.get(5)?;
    Ok(Evaluation {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        idea_id: row.get(2)?,
        evaluator_id: row.get(3)?,
        evaluator_name: row.get(4)?,
        evaluator_role: EvaluatorRole::from(role),
        criterion_id: row.get(6)?,
        score: row.get(7)?,
        comments: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Chronological: creation time, then insertion order.
pub(crate) fn load_evaluations(
    conn: &Connection,
    idea_id: &str,
) -> Result<Vec<Evaluation>, PipelineError> {
    let mut stmt = conn.prepare(
        "SELECT id, batch_id, idea_id, evaluator_id, evaluator_name, evaluator_role, criterion_id, score, comments, created_at
         FROM evaluations WHERE idea_id = ?1 ORDER BY created_at, seq",
    )?;
    let rows = stmt.query_map(params![idea_id], evaluation_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn insert_evaluation(conn: &Connection, e: &Evaluation) -> Result<(), PipelineError> {
    conn.execute(
        "INSERT INTO evaluations(id, batch_id, idea_id, evaluator_id, evaluator_name, evaluator_role, criterion_id, score, comments, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            e.id,
            e.batch_id,
            e.idea_id,
            e.evaluator_id,
            e.evaluator_name,
            e.evaluator_role.as_str(),
            e.criterion_id,
            e.score,
            e.comments,
            e.created_at
        ],
    )?;
    Ok(())
}

/// Shape checks that need no storage. Runs before anything is written.
fn validate_submission(sub: &EvaluationSubmission) -> Result<(), PipelineError> {
    if sub.evaluator_id.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "evaluator_id cannot be empty".to_string(),
        ));
    }
    if sub.scores.is_empty() {
        return Err(PipelineError::ValidationError(
            "no scores supplied".to_string(),
        ));
    }
    let mut seen = FxHashSet::default();
    for s in &sub.scores {
        if !s.score.is_finite() || !(0.0..=100.0).contains(&s.score) {
            return Err(PipelineError::ValidationError(format!(
                "score for criterion '{}' must be between 0 and 100, got {}",
                s.criterion_id, s.score
            )));
        }
        if !seen.insert(s.criterion_id.as_str()) {
            return Err(PipelineError::ValidationError(format!(
                "criterion '{}' scored more than once in one submission",
                s.criterion_id
            )));
        }
    }
    Ok(())
}

fn target_state(role: &EvaluatorRole) -> Option<(IdeaState, &'static str)> {
    match role {
        EvaluatorRole::Ai => Some((IdeaState::AiJudged, ACTION_AI_JUDGED)),
        EvaluatorRole::Human => Some((IdeaState::HumanJudged, ACTION_HUMAN_JUDGED)),
        EvaluatorRole::Other(_) => None,
    }
}

fn human_projection(
    ctx: &PipelineContext,
    evaluations: &[Evaluation],
    criteria: &[JudgingCriterion],
) -> f64 {
    scoring::aggregate_score(
        evaluations,
        criteria,
        &RoleFilter::Only(EvaluatorRole::Human),
        ctx.config.judging.human_aggregation,
    )
}

/// Records a batch of per-criterion scores, refreshes the role's cached
/// projection and, when the state machine allows it, advances the idea.
pub fn submit_evaluation(
    ctx: &PipelineContext,
    sub: EvaluationSubmission,
) -> Result<SubmissionOutcome, PipelineError> {
    validate_submission(&sub)?;

    ctx.store
        .broker()
        .with_idea_lock(&sub.idea_id, "judging.submit", |conn| {
            let idea = ideas::load_idea(conn, &sub.idea_id)?;
            let criteria = load_criteria(conn)?;
            if criteria.is_empty() {
                return Err(PipelineError::ValidationError(
                    "no judging criteria configured".to_string(),
                ));
            }
            let known: FxHashMap<&str, &JudgingCriterion> =
                criteria.iter().map(|c| (c.id.as_str(), c)).collect();
            if let Some(missing) = sub
                .scores
                .iter()
                .find(|s| !known.contains_key(s.criterion_id.as_str()))
            {
                return Err(PipelineError::NotFound(format!(
                    "criterion '{}'",
                    missing.criterion_id
                )));
            }

            let now = ctx.now();
            let batch_id = new_id();
            let batch: Vec<Evaluation> = sub
                .scores
                .iter()
                .map(|s| Evaluation {
                    id: new_id(),
                    batch_id: batch_id.clone(),
                    idea_id: idea.id.clone(),
                    evaluator_id: sub.evaluator_id.clone(),
                    evaluator_name: sub.evaluator_name.clone(),
                    evaluator_role: sub.evaluator_role.clone(),
                    criterion_id: s.criterion_id.clone(),
                    score: s.score,
                    comments: s.comments.clone(),
                    created_at: now,
                })
                .collect();
            let submission_score = scoring::batch_score(&batch, &criteria);

            let tx = conn.unchecked_transaction()?;
            for e in &batch {
                insert_evaluation(&tx, e)?;
            }
            let projected_score = match sub.evaluator_role {
                EvaluatorRole::Ai => {
                    tx.execute(
                        "UPDATE ideas SET latest_ai_score = ?1, updated_at = ?2 WHERE id = ?3",
                        params![submission_score, now, idea.id],
                    )?;
                    Some(submission_score)
                }
                EvaluatorRole::Human => {
                    let all = load_evaluations(&tx, &idea.id)?;
                    let score = human_projection(ctx, &all, &criteria);
                    tx.execute(
                        "UPDATE ideas SET final_judging_score = ?1, updated_at = ?2 WHERE id = ?3",
                        params![score, now, idea.id],
                    )?;
                    Some(score)
                }
                EvaluatorRole::Other(_) => None,
            };
            tx.commit()?;

            ctx.audit(
                &sub.evaluator_id,
                ACTION_EVALUATION_SUBMITTED,
                "idea",
                &idea.id,
                serde_json::json!({
                    "batch_id": batch_id,
                    "evaluator_role": sub.evaluator_role,
                    "criteria": batch.len(),
                    "submission_score": submission_score,
                    "projected_score": projected_score,
                }),
            );

            let mut transition_outcome = None;
            if let Some((target, action)) = target_state(&sub.evaluator_role) {
                if state_machine::can_transition(idea.state, target) {
                    let req = TransitionRequest::new(
                        &idea.id,
                        target,
                        &sub.evaluator_id,
                        sub.evaluator_role.as_str(),
                    )
                    .with_action(action)
                    .with_notes(&format!("weighted score {:.2}", projected_score.unwrap_or(submission_score)));
                    transition_outcome =
                        Some(transition::apply_transition_locked(ctx, conn, &req)?);
                } else {
                    tracing::debug!(
                        idea_id = %idea.id,
                        state = %idea.state,
                        target_state = %target,
                        "score recorded without transition"
                    );
                }
            }

            Ok(SubmissionOutcome {
                idea_id: idea.id,
                batch_id,
                evaluator_role: sub.evaluator_role.clone(),
                submission_score,
                projected_score,
                transition: transition_outcome,
            })
        })
}

/// AI pre-judging: the `ai` branch of [`submit_evaluation`] under a fixed evaluator identity.
pub fn run_ai_prejudging(
    ctx: &PipelineContext,
    idea_id: &str,
    criteria_scores: Vec<ScoreInput>,
) -> Result<SubmissionOutcome, PipelineError> {
    submit_evaluation(
        ctx,
        EvaluationSubmission {
            idea_id: idea_id.to_string(),
            evaluator_id: AI_PREJUDGE_EVALUATOR_ID.to_string(),
            evaluator_name: AI_PREJUDGE_EVALUATOR_NAME.to_string(),
            evaluator_role: EvaluatorRole::Ai,
            scores: criteria_scores,
        },
    )
}

fn compute_projection(
    ctx: &PipelineContext,
    idea_id: &str,
    evaluations: &[Evaluation],
    criteria: &[JudgingCriterion],
) -> ScoreProjection {
    let latest_ai_batch = evaluations
        .iter()
        .rev()
        .find(|e| e.evaluator_role == EvaluatorRole::Ai)
        .map(|e| e.batch_id.as_str());
    let latest_ai_score = latest_ai_batch.map(|batch_id| {
        let rows: Vec<Evaluation> = evaluations
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect();
        scoring::batch_score(&rows, criteria)
    });
    let has_human = evaluations
        .iter()
        .any(|e| e.evaluator_role == EvaluatorRole::Human);
    let final_judging_score = has_human.then(|| human_projection(ctx, evaluations, criteria));

    ScoreProjection {
        idea_id: idea_id.to_string(),
        latest_ai_score,
        final_judging_score,
    }
}

/// Rebuilds the cached score columns from evaluation rows.
pub fn recompute_scores(
    ctx: &PipelineContext,
    idea_id: &str,
) -> Result<ScoreProjection, PipelineError> {
    ctx.store
        .broker()
        .with_idea_lock(idea_id, "judging.recompute", |conn| {
            let idea = ideas::load_idea(conn, idea_id)?;
            let criteria = load_criteria(conn)?;
            let evaluations = load_evaluations(conn, &idea.id)?;
            let projection = compute_projection(ctx, &idea.id, &evaluations, &criteria);
            conn.execute(
                "UPDATE ideas SET latest_ai_score = ?1, final_judging_score = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    projection.latest_ai_score,
                    projection.final_judging_score,
                    ctx.now(),
                    idea.id
                ],
            )?;
            if projection.latest_ai_score != idea.latest_ai_score
                || projection.final_judging_score != idea.final_judging_score
            {
                tracing::warn!(
                    idea_id = %idea.id,
                    cached_ai = ?idea.latest_ai_score,
                    cached_final = ?idea.final_judging_score,
                    "cached scores were stale; rebuilt from evaluations"
                );
            }
            Ok(projection)
        })
}

fn insights(averages: Vec<CriterionAverage>, criteria: &[JudgingCriterion]) -> Vec<CriterionInsight> {
    averages
        .into_iter()
        .map(|a| {
            let label = criteria
                .iter()
                .find(|c| c.id == a.criterion_id)
                .map(|c| c.label.clone())
                .unwrap_or_else(|| a.criterion_id.clone());
            CriterionInsight {
                criterion_id: a.criterion_id,
                label,
                average: a.average,
            }
        })
        .collect()
}

/// Read-only judging report for one idea.
///
/// Criterion averages come from human rows, or from all rows when no human
/// has judged yet.
pub fn get_judging_summary(
    ctx: &PipelineContext,
    idea_id: &str,
) -> Result<JudgingSummary, PipelineError> {
    ctx.store.broker().with_conn("judging.summary", |conn| {
        let idea = ideas::load_idea(conn, idea_id)?;
        let criteria = load_criteria(conn)?;
        let evaluations = load_evaluations(conn, &idea.id)?;

        let evaluator_scores = scoring::evaluator_scores(&evaluations, &criteria);
        let filter = if evaluations
            .iter()
            .any(|e| e.evaluator_role == EvaluatorRole::Human)
        {
            RoleFilter::Only(EvaluatorRole::Human)
        } else {
            RoleFilter::Any
        };
        let policy = ctx.config.judging.human_aggregation;
        let averages = scoring::criterion_averages(&evaluations, &filter, policy);
        let average_score = scoring::aggregate_score(&evaluations, &criteria, &filter, policy);
        let (strengths, weaknesses) =
            scoring::strengths_and_weaknesses(&averages, ctx.config.judging.thresholds());

        Ok(JudgingSummary {
            idea_id: idea.id,
            strengths: insights(strengths, &criteria),
            weaknesses: insights(weaknesses, &criteria),
            criteria,
            evaluations,
            evaluator_scores,
            average_score,
        })
    })
}
