//! CLI struct definitions for the `ideaflow` command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use crate::core::state_machine::IdeaState;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "ideaflow",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first innovation pipeline: guarded idea lifecycle, weighted judging and execution provisioning."
)]
pub(crate) struct Cli {
    /// Pipeline store directory (database, audit log, pipeline.toml).
    #[clap(long, global = true, default_value = ".ideaflow")]
    pub root: PathBuf,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the store directory and database
    Init,
    /// Submit and inspect ideas
    Idea(IdeaCli),
    /// Move an idea to another lifecycle state
    Transition(TransitionCli),
    /// Judging criteria
    Criteria(CriteriaCli),
    /// Evaluations and scores
    Judge(JudgeCli),
    /// Execution projects
    Project(ProjectCli),
    /// Scan the store for partial or inconsistent state
    Reconcile,
}

#[derive(clap::Args, Debug)]
pub(crate) struct IdeaCli {
    #[clap(subcommand)]
    pub command: IdeaCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum IdeaCommand {
    /// Submit a new idea
    Add {
        title: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long)]
        owner_id: String,
        #[clap(long, default_value = "")]
        owner_name: String,
    },
    /// Show one idea
    Show { id: String },
    /// List ideas, optionally filtered by state
    List {
        #[clap(long, value_parser = parse_state)]
        state: Option<IdeaState>,
    },
    /// Lifecycle events and time spent in each stage
    History { id: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct TransitionCli {
    pub idea_id: String,
    #[clap(value_parser = parse_state)]
    pub to: IdeaState,
    #[clap(long)]
    pub actor_id: String,
    #[clap(long, default_value = "admin")]
    pub actor_role: String,
    #[clap(long)]
    pub notes: Option<String>,
    /// Provision the execution project when approving for execution.
    #[clap(long)]
    pub auto_project: bool,
    #[clap(long)]
    pub pm_name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct CriteriaCli {
    #[clap(subcommand)]
    pub command: CriteriaCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CriteriaCommand {
    /// Add a weighted judging criterion
    Add {
        label: String,
        #[clap(long)]
        weight: f64,
        /// Explicit id; a ULID is generated otherwise.
        #[clap(long)]
        id: Option<String>,
    },
    /// List criteria
    List,
}

#[derive(clap::Args, Debug)]
pub(crate) struct JudgeCli {
    #[clap(subcommand)]
    pub command: JudgeCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum JudgeCommand {
    /// Submit one evaluator's scores
    Submit {
        idea_id: String,
        #[clap(long)]
        evaluator_id: String,
        #[clap(long, default_value = "")]
        evaluator_name: String,
        #[clap(long, default_value = "human")]
        role: String,
        /// `criterion_id=score`, repeatable.
        #[clap(long = "score", value_parser = parse_score, required = true)]
        scores: Vec<(String, f64)>,
    },
    /// Record AI pre-judging scores
    Ai {
        idea_id: String,
        /// `criterion_id=score`, repeatable.
        #[clap(long = "score", value_parser = parse_score, required = true)]
        scores: Vec<(String, f64)>,
    },
    /// Judging report with strengths and weaknesses
    Summary { idea_id: String },
    /// Rebuild cached scores from evaluation rows
    Recompute { idea_id: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ProjectCli {
    #[clap(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ProjectCommand {
    /// Get-or-create the execution project for an approved idea
    Provision {
        idea_id: String,
        #[clap(long)]
        pm_name: Option<String>,
    },
    /// Show the project with tasks, risks and KPIs
    Show { idea_id: String },
}

fn parse_state(raw: &str) -> Result<IdeaState, String> {
    raw.parse::<IdeaState>().map_err(|e| e.to_string())
}

fn parse_score(raw: &str) -> Result<(String, f64), String> {
    let (id, score) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected criterion_id=score, got '{}'", raw))?;
    let score: f64 = score
        .trim()
        .parse()
        .map_err(|_| format!("score '{}' is not a number", score))?;
    Ok((id.trim().to_string(), score))
}
