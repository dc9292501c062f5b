//! Ideaflow: a local-first innovation pipeline.
//!
//! Ideas move through a fixed, forward-only lifecycle from submission to
//! publication. Every state change goes through one guarded transition
//! engine that writes the new state and its lifecycle event atomically.
//! Judging combines weighted per-criterion scores from AI and human
//! evaluators, and approval for execution provisions exactly one project
//! per idea with starter tasks, risks and KPIs.
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! All reads and writes route through `DbBroker` over a single SQLite store
//! (`<root>/pipeline.db`). Read-modify-write operations on one idea run
//! under a per-idea lock; operations on different ideas do not contend.
//!
//! ## Audit
//!
//! Audit records are appended to `<root>/audit.events.jsonl` through an
//! injectable `AuditSink`. Audit failures are logged and never fail the
//! operation that produced them.
//!
//! # Examples
//!
//! ```bash
//! ideaflow init
//! ideaflow criteria add Impact --weight 2 --id impact
//! ideaflow idea add "Automate invoice matching" --owner-id u-17
//! ideaflow judge ai <IDEA_ID> --score impact=78
//! ideaflow transition <IDEA_ID> approved_for_execution --actor-id admin --auto-project
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: state machine, scoring, storage plumbing, clock, audit, config
//! - [`pipeline`]: idea intake, transitions, judging, provisioning, reconciliation

mod cli;
pub mod core;
pub mod pipeline;

use crate::cli::{
    Cli, Command, CriteriaCommand, IdeaCommand, JudgeCommand, OutputFormat, ProjectCommand,
};
use crate::core::error::PipelineError;
use crate::core::scoring::EvaluatorRole;
use crate::core::state_machine;
use crate::core::time::epoch_z;
use crate::pipeline::PipelineContext;
use crate::pipeline::ideas::{self, Idea, NewIdea};
use crate::pipeline::judging::{self, EvaluationSubmission, ScoreInput};
use crate::pipeline::provision;
use crate::pipeline::reconcile;
use crate::pipeline::transition::{self, TransitionRequest};

use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::fs;

fn print_json<T: Serialize>(value: &T) -> Result<(), PipelineError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn score_text(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.2}", s))
}

fn print_idea_line(idea: &Idea) {
    println!(
        "{} {} {} ai={} final={}",
        idea.id.bright_white().bold(),
        format!("[{}]", idea.state).bright_cyan(),
        idea.title,
        score_text(idea.latest_ai_score),
        score_text(idea.final_judging_score)
    );
}

fn score_inputs(scores: Vec<(String, f64)>) -> Vec<ScoreInput> {
    scores
        .into_iter()
        .map(|(criterion_id, score)| ScoreInput {
            criterion_id,
            score,
            comments: None,
        })
        .collect()
}

pub fn run() -> Result<(), PipelineError> {
    let cli = Cli::parse();
    let json = cli.format == OutputFormat::Json;

    if !cli.root.exists() {
        fs::create_dir_all(&cli.root)?;
    }
    let ctx = PipelineContext::open(&cli.root)?;

    match cli.command {
        Command::Init => {
            if json {
                print_json(&serde_json::json!({
                    "root": cli.root.display().to_string(),
                    "db": ctx.store.db_path().display().to_string(),
                }))?;
            } else {
                println!(
                    "{} pipeline store ready at {}",
                    "✓".bright_green(),
                    cli.root.display().to_string().bright_white().bold()
                );
            }
        }

        Command::Idea(idea_cli) => match idea_cli.command {
            IdeaCommand::Add {
                title,
                description,
                owner_id,
                owner_name,
            } => {
                let idea = ideas::submit_idea(
                    &ctx,
                    NewIdea {
                        title,
                        description,
                        owner_id,
                        owner_name,
                    },
                )?;
                if json {
                    print_json(&idea)?;
                } else {
                    println!("{} submitted", "✓".bright_green());
                    print_idea_line(&idea);
                }
            }
            IdeaCommand::Show { id } => {
                let idea = ideas::get_idea(&ctx, &id)?;
                if json {
                    print_json(&idea)?;
                } else {
                    print_idea_line(&idea);
                    if !idea.description.is_empty() {
                        println!("  {}", idea.description);
                    }
                    println!("  owner: {} {}", idea.owner_id, idea.owner_name);
                    let next = state_machine::allowed_transitions(idea.state)
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>();
                    match state_machine::next_suggested(idea.state) {
                        _ if state_machine::is_terminal(idea.state) => {
                            println!("  {}", "terminal".bright_yellow())
                        }
                        Some(suggested) => println!(
                            "  next: {} (allowed: {})",
                            suggested.as_str().bright_cyan(),
                            next.join(", ")
                        ),
                        None => {}
                    }
                }
            }
            IdeaCommand::List { state } => {
                let list = ideas::list_ideas(&ctx, state)?;
                if json {
                    print_json(&list)?;
                } else if list.is_empty() {
                    println!("no ideas");
                } else {
                    for idea in &list {
                        print_idea_line(idea);
                    }
                }
            }
            IdeaCommand::History { id } => {
                let events = ideas::lifecycle_history(&ctx, &id)?;
                let durations = ideas::stage_durations(&events, ctx.now());
                if json {
                    print_json(&serde_json::json!({
                        "events": events,
                        "durations": durations,
                    }))?;
                } else {
                    for (ev, d) in events.iter().zip(durations.iter()) {
                        let from = ev.from_state.map_or("-", |s| s.as_str());
                        println!(
                            "{} {} -> {} {} by {} ({}) {}s{}",
                            epoch_z(ev.created_at),
                            from,
                            ev.to_state.as_str().bright_cyan(),
                            ev.action.bright_white(),
                            ev.actor_id,
                            ev.actor_role,
                            d.duration_secs,
                            if d.open { " (current)" } else { "" }
                        );
                    }
                }
            }
        },

        Command::Transition(t) => {
            let mut req = TransitionRequest::new(&t.idea_id, t.to, &t.actor_id, &t.actor_role);
            if let Some(notes) = &t.notes {
                req = req.with_notes(notes);
            }
            if t.auto_project {
                req = req.with_auto_project(t.pm_name.as_deref());
            }
            let outcome = transition::apply_transition(&ctx, &req)?;
            if json {
                print_json(&outcome)?;
            } else {
                println!(
                    "{} {} {} -> {}",
                    "✓".bright_green(),
                    outcome.idea_id.bright_white().bold(),
                    outcome.from_state,
                    outcome.to_state.as_str().bright_cyan()
                );
                if let Some(project_id) = &outcome.project_id {
                    println!("  project {}", project_id.bright_white());
                }
            }
        }

        Command::Criteria(c) => match c.command {
            CriteriaCommand::Add { label, weight, id } => {
                let criterion = judging::add_criterion(&ctx, id.as_deref(), &label, weight)?;
                if json {
                    print_json(&criterion)?;
                } else {
                    println!(
                        "{} criterion {} ({}) weight {}",
                        "✓".bright_green(),
                        criterion.id.bright_white().bold(),
                        criterion.label,
                        criterion.weight
                    );
                }
            }
            CriteriaCommand::List => {
                let criteria = judging::list_criteria(&ctx)?;
                if json {
                    print_json(&criteria)?;
                } else {
                    for c in &criteria {
                        println!("{} {} weight {}", c.id.bright_white().bold(), c.label, c.weight);
                    }
                }
            }
        },

        Command::Judge(j) => match j.command {
            JudgeCommand::Submit {
                idea_id,
                evaluator_id,
                evaluator_name,
                role,
                scores,
            } => {
                let outcome = judging::submit_evaluation(
                    &ctx,
                    EvaluationSubmission {
                        idea_id,
                        evaluator_id,
                        evaluator_name,
                        evaluator_role: EvaluatorRole::from(role),
                        scores: score_inputs(scores),
                    },
                )?;
                print_submission(json, &outcome)?;
            }
            JudgeCommand::Ai { idea_id, scores } => {
                let outcome = judging::run_ai_prejudging(&ctx, &idea_id, score_inputs(scores))?;
                print_submission(json, &outcome)?;
            }
            JudgeCommand::Summary { idea_id } => {
                let summary = judging::get_judging_summary(&ctx, &idea_id)?;
                if json {
                    print_json(&summary)?;
                } else {
                    println!(
                        "{} average {:.2} from {} evaluator(s)",
                        summary.idea_id.bright_white().bold(),
                        summary.average_score,
                        summary.evaluator_scores.len()
                    );
                    for s in &summary.strengths {
                        println!("  {} {} {:.2}", "+".bright_green(), s.label, s.average);
                    }
                    for w in &summary.weaknesses {
                        println!("  {} {} {:.2}", "-".bright_red(), w.label, w.average);
                    }
                }
            }
            JudgeCommand::Recompute { idea_id } => {
                let projection = judging::recompute_scores(&ctx, &idea_id)?;
                if json {
                    print_json(&projection)?;
                } else {
                    println!(
                        "{} ai={} final={}",
                        projection.idea_id.bright_white().bold(),
                        score_text(projection.latest_ai_score),
                        score_text(projection.final_judging_score)
                    );
                }
            }
        },

        Command::Project(p) => match p.command {
            ProjectCommand::Provision { idea_id, pm_name } => {
                let outcome = provision::provision_project(&ctx, &idea_id, pm_name.as_deref())?;
                if json {
                    print_json(&outcome)?;
                } else {
                    let what = if outcome.created {
                        "created"
                    } else if outcome.completed_existing {
                        "completed"
                    } else {
                        "already provisioned"
                    };
                    println!(
                        "{} project {} {}",
                        "✓".bright_green(),
                        outcome.project_id.bright_white().bold(),
                        what
                    );
                }
            }
            ProjectCommand::Show { idea_id } => {
                let bundle = provision::get_project(&ctx, &idea_id)?
                    .ok_or_else(|| PipelineError::NotFound(format!("project for idea '{}'", idea_id)))?;
                if json {
                    print_json(&bundle)?;
                } else {
                    let p = &bundle.project;
                    println!(
                        "{} {} [{}] pm {} {} .. {}",
                        p.id.bright_white().bold(),
                        p.name,
                        p.status.bright_cyan(),
                        p.pm_name,
                        epoch_z(p.start_at),
                        epoch_z(p.end_at)
                    );
                    for t in &bundle.tasks {
                        println!("  task  {} due {} [{}]", t.title, epoch_z(t.due_at), t.status);
                    }
                    for r in &bundle.risks {
                        println!("  risk  {} ({})", r.title, r.severity.bright_yellow());
                    }
                    for k in &bundle.kpis {
                        println!(
                            "  kpi   {} {} -> {} {}",
                            k.name, k.baseline, k.target, k.unit
                        );
                    }
                }
            }
        },

        Command::Reconcile => {
            let report = reconcile::reconcile(&ctx)?;
            if json {
                print_json(&report)?;
            } else if report.is_clean() {
                println!(
                    "{} {} idea(s) scanned, no findings",
                    "✓".bright_green(),
                    report.ideas_scanned
                );
            } else {
                for d in &report.state_drift {
                    println!(
                        "{} {} state {} but last event {}",
                        "⚠".bright_yellow(),
                        d.idea_id,
                        d.idea_state,
                        d.last_event_state.map_or("none", |s| s.as_str())
                    );
                }
                for id in &report.missing_projects {
                    println!("{} {} approved without a project", "⚠".bright_yellow(), id);
                }
                for id in &report.incomplete_projects {
                    println!("{} project {} missing starter content", "⚠".bright_yellow(), id);
                }
            }
        }
    }

    Ok(())
}

fn print_submission(
    json: bool,
    outcome: &judging::SubmissionOutcome,
) -> Result<(), PipelineError> {
    if json {
        return print_json(outcome);
    }
    println!(
        "{} {} {} batch score {:.2}, projection {}",
        "✓".bright_green(),
        outcome.idea_id.bright_white().bold(),
        outcome.evaluator_role,
        outcome.submission_score,
        score_text(outcome.projected_score)
    );
    if let Some(t) = &outcome.transition {
        println!("  {} -> {}", t.from_state, t.to_state.as_str().bright_cyan());
    }
    Ok(())
}
