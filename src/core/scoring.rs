//! Weighted score aggregation.
//!
//! One formula, [`weighted_average`], is applied at every level: a single
//! evaluator's cross-criterion score, and an idea's cross-evaluator score.
//! Grouping and role filtering happen before the formula, never inside it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRow {
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgingCriterion {
    pub id: String,
    pub label: String,
    pub weight: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EvaluatorRole {
    Ai,
    Human,
    Other(String),
}

impl EvaluatorRole {
    pub fn as_str(&self) -> &str {
        match self {
            EvaluatorRole::Ai => "ai",
            EvaluatorRole::Human => "human",
            EvaluatorRole::Other(role) => role,
        }
    }
}

impl From<&str> for EvaluatorRole {
    fn from(value: &str) -> Self {
        match value {
            "ai" => EvaluatorRole::Ai,
            "human" => EvaluatorRole::Human,
            other => EvaluatorRole::Other(other.to_string()),
        }
    }
}

impl From<String> for EvaluatorRole {
    fn from(value: String) -> Self {
        EvaluatorRole::from(value.as_str())
    }
}

impl From<EvaluatorRole> for String {
    fn from(value: EvaluatorRole) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EvaluatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub id: String,
    /// Rows submitted together share a batch id.
    pub batch_id: String,
    pub idea_id: String,
    pub evaluator_id: String,
    pub evaluator_name: String,
    pub evaluator_role: EvaluatorRole,
    pub criterion_id: String,
    pub score: f64,
    pub comments: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleFilter {
    Any,
    Only(EvaluatorRole),
}

impl RoleFilter {
    pub fn matches(&self, role: &EvaluatorRole) -> bool {
        match self {
            RoleFilter::Any => true,
            RoleFilter::Only(wanted) => wanted == role,
        }
    }
}

/// How repeated rows from one evaluator on one criterion are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanAggregation {
    /// Every historical row counts; re-judging rounds blend with earlier ones.
    #[default]
    AllRows,
    /// Only the newest row per (evaluator, criterion) counts.
    LatestPerEvaluator,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluatorScore {
    pub evaluator_id: String,
    pub evaluator_name: String,
    pub evaluator_role: EvaluatorRole,
    pub score: f64,
    pub criteria_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CriterionAverage {
    pub criterion_id: String,
    pub average: f64,
    pub samples: usize,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `sum(score * weight) / sum(weight)`, rounded to two decimals.
/// Returns 0 when the total weight is 0.
pub fn weighted_average(rows: &[ScoreRow]) -> f64 {
    let total_weight: f64 = rows.iter().map(|r| r.weight).sum();
    if total_weight == 0.0 || !total_weight.is_finite() {
        return 0.0;
    }
    let weighted: f64 = rows.iter().map(|r| r.score * r.weight).sum();
    round2(weighted / total_weight)
}

pub fn weight_index(criteria: &[JudgingCriterion]) -> FxHashMap<&str, f64> {
    criteria.iter().map(|c| (c.id.as_str(), c.weight)).collect()
}

/// Rows whose criterion has no known weight are skipped.
fn rows_for<'a, I>(evaluations: I, weights: &FxHashMap<&str, f64>) -> Vec<ScoreRow>
where
    I: IntoIterator<Item = &'a Evaluation>,
{
    evaluations
        .into_iter()
        .filter_map(|e| {
            weights.get(e.criterion_id.as_str()).map(|w| ScoreRow {
                score: e.score,
                weight: *w,
            })
        })
        .collect()
}

/// Weighted score of one evaluator per `(evaluator_id, evaluator_role)`, in first-seen order.
pub fn evaluator_scores(
    evaluations: &[Evaluation],
    criteria: &[JudgingCriterion],
) -> Vec<EvaluatorScore> {
    let weights = weight_index(criteria);
    let mut order: Vec<(&str, &EvaluatorRole)> = Vec::new();
    let mut groups: FxHashMap<(&str, &EvaluatorRole), Vec<&Evaluation>> = FxHashMap::default();
    for e in evaluations {
        let key = (e.evaluator_id.as_str(), &e.evaluator_role);
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(e);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let rows = groups.remove(&key)?;
            let first = rows.first()?;
            let mut criteria_seen: Vec<&str> = rows.iter().map(|e| e.criterion_id.as_str()).collect();
            criteria_seen.sort_unstable();
            criteria_seen.dedup();
            Some(EvaluatorScore {
                evaluator_id: first.evaluator_id.clone(),
                evaluator_name: first.evaluator_name.clone(),
                evaluator_role: first.evaluator_role.clone(),
                score: weighted_average(&rows_for(rows.iter().copied(), &weights)),
                criteria_count: criteria_seen.len(),
            })
        })
        .collect()
}

/// Drops rows superseded by a later row from the same evaluator on the same criterion.
/// Input order is taken as chronological.
fn latest_per_evaluator(evaluations: Vec<&Evaluation>) -> Vec<&Evaluation> {
    let mut latest: FxHashMap<(&str, &str), usize> = FxHashMap::default();
    for (idx, e) in evaluations.iter().enumerate() {
        latest.insert((e.evaluator_id.as_str(), e.criterion_id.as_str()), idx);
    }
    evaluations
        .iter()
        .enumerate()
        .filter(|(idx, e)| {
            latest.get(&(e.evaluator_id.as_str(), e.criterion_id.as_str())) == Some(idx)
        })
        .map(|(_, e)| *e)
        .collect()
}

fn select<'a>(
    evaluations: &'a [Evaluation],
    filter: &RoleFilter,
    policy: HumanAggregation,
) -> Vec<&'a Evaluation> {
    let selected: Vec<&Evaluation> = evaluations
        .iter()
        .filter(|e| filter.matches(&e.evaluator_role))
        .collect();
    match policy {
        HumanAggregation::AllRows => selected,
        HumanAggregation::LatestPerEvaluator => latest_per_evaluator(selected),
    }
}

/// Unrounded mean per criterion across the selected rows, sorted by criterion id.
fn criterion_means(
    evaluations: &[Evaluation],
    filter: &RoleFilter,
    policy: HumanAggregation,
) -> Vec<CriterionAverage> {
    let mut sums: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
    for e in select(evaluations, filter, policy) {
        let entry = sums.entry(e.criterion_id.as_str()).or_insert((0.0, 0));
        entry.0 += e.score;
        entry.1 += 1;
    }
    let mut out: Vec<CriterionAverage> = sums
        .into_iter()
        .map(|(criterion_id, (sum, samples))| CriterionAverage {
            criterion_id: criterion_id.to_string(),
            average: sum / samples as f64,
            samples,
        })
        .collect();
    out.sort_by(|a, b| a.criterion_id.cmp(&b.criterion_id));
    out
}

/// Plain mean per criterion, rounded to two decimals for reporting.
/// Scoring goes through [`aggregate_score`], which weights the unrounded means.
pub fn criterion_averages(
    evaluations: &[Evaluation],
    filter: &RoleFilter,
    policy: HumanAggregation,
) -> Vec<CriterionAverage> {
    criterion_means(evaluations, filter, policy)
        .into_iter()
        .map(|mut avg| {
            avg.average = round2(avg.average);
            avg
        })
        .collect()
}

/// Per-criterion mean across evaluators, then weighted across criteria.
/// Only the final weighted value is rounded.
pub fn aggregate_score(
    evaluations: &[Evaluation],
    criteria: &[JudgingCriterion],
    filter: &RoleFilter,
    policy: HumanAggregation,
) -> f64 {
    let weights = weight_index(criteria);
    let rows: Vec<ScoreRow> = criterion_means(evaluations, filter, policy)
        .into_iter()
        .filter_map(|avg| {
            weights.get(avg.criterion_id.as_str()).map(|w| ScoreRow {
                score: avg.average,
                weight: *w,
            })
        })
        .collect();
    weighted_average(&rows)
}

/// Weighted average of a single submitted batch.
pub fn batch_score(evaluations: &[Evaluation], criteria: &[JudgingCriterion]) -> f64 {
    weighted_average(&rows_for(evaluations, &weight_index(criteria)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub strength: f64,
    pub weakness: f64,
    pub cap: usize,
}

/// Strengths are averages at or above `strength`, strongest first. Weaknesses are
/// averages strictly between 0 and `weakness`, weakest first. Both capped.
pub fn strengths_and_weaknesses(
    averages: &[CriterionAverage],
    thresholds: Thresholds,
) -> (Vec<CriterionAverage>, Vec<CriterionAverage>) {
    let mut strengths: Vec<CriterionAverage> = averages
        .iter()
        .filter(|a| a.average >= thresholds.strength)
        .cloned()
        .collect();
    strengths.sort_by(|a, b| b.average.total_cmp(&a.average));
    strengths.truncate(thresholds.cap);

    let mut weaknesses: Vec<CriterionAverage> = averages
        .iter()
        .filter(|a| a.average > 0.0 && a.average < thresholds.weakness)
        .cloned()
        .collect();
    weaknesses.sort_by(|a, b| a.average.total_cmp(&b.average));
    weaknesses.truncate(thresholds.cap);

    (strengths, weaknesses)
}
