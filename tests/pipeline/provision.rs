use ideaflow::core::audit::MemoryAuditSink;
use ideaflow::core::config::PipelineConfig;
use ideaflow::core::error::PipelineError;
use ideaflow::core::state_machine::IdeaState;
use ideaflow::core::store::Store;
use ideaflow::core::time::{FixedClock, SECS_PER_DAY};
use ideaflow::pipeline::PipelineContext;
use ideaflow::pipeline::ideas::{self, NewIdea};
use ideaflow::pipeline::provision::{
    self, ACTION_PROJECT_AUTO_CREATED, ACTION_PROJECT_COMPLETED, PROJECT_STATUS_PLANNED,
    TASK_STATUS_TODO,
};
use ideaflow::pipeline::reconcile;
use ideaflow::pipeline::transition::{TransitionRequest, apply_transition};
use rusqlite::params;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::tempdir;

const T0: i64 = 1_700_000_000;

struct Harness {
    ctx: PipelineContext,
    audit: Arc<MemoryAuditSink>,
}

fn harness(root: &Path, config: PipelineConfig) -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let ctx = PipelineContext::with_parts(
        Store::new(root),
        config,
        Arc::new(FixedClock::new(T0)),
        audit.clone(),
    )
    .unwrap();
    Harness { ctx, audit }
}

fn approved_idea(ctx: &PipelineContext, title: &str) -> String {
    let id = ideas::submit_idea(
        ctx,
        NewIdea {
            title: title.to_string(),
            owner_id: "u-1".to_string(),
            ..Default::default()
        },
    )
    .unwrap()
    .id;
    for to in [
        IdeaState::AiRefined,
        IdeaState::TeamFormed,
        IdeaState::PrototypeReady,
        IdeaState::AiJudged,
        IdeaState::HumanJudged,
        IdeaState::ApprovedForExecution,
    ] {
        apply_transition(ctx, &TransitionRequest::new(&id, to, "admin-1", "admin")).unwrap();
    }
    id
}

fn count(ctx: &PipelineContext, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(ctx.store.db_path()).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn test_provisioning_twice_creates_exactly_one_project() {
    let tmp = tempdir().unwrap();
    let h = harness(tmp.path(), PipelineConfig::default());
    let id = approved_idea(&h.ctx, "Smart invoice matching");

    let first = provision::provision_project(&h.ctx, &id, Some("Priya")).unwrap();
    assert!(first.created);
    let second = provision::provision_project(&h.ctx, &id, Some("Someone else")).unwrap();
    assert!(!second.created);
    assert!(!second.completed_existing);
    assert_eq!(first.project_id, second.project_id);

    assert_eq!(count(&h.ctx, "projects"), 1);
    assert_eq!(count(&h.ctx, "project_tasks"), 3);
    assert_eq!(count(&h.ctx, "project_risks"), 2);
    assert_eq!(count(&h.ctx, "project_kpis"), 2);

    let created: Vec<_> = h
        .audit
        .records()
        .into_iter()
        .filter(|r| r.action == ACTION_PROJECT_AUTO_CREATED)
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].entity_id, first.project_id);
}

#[test]
fn test_project_window_and_starter_content() {
    let tmp = tempdir().unwrap();
    let h = harness(tmp.path(), PipelineConfig::default());
    let id = approved_idea(&h.ctx, "Onboarding chatbot");
    provision::provision_project(&h.ctx, &id, None).unwrap();

    let bundle = provision::get_project(&h.ctx, &id).unwrap().unwrap();
    let p = &bundle.project;
    assert_eq!(p.start_at, T0);
    assert_eq!(p.end_at, T0 + 90 * SECS_PER_DAY);
    assert_eq!(p.status, PROJECT_STATUS_PLANNED);
    assert_eq!(p.progress, 0);
    assert_eq!(p.pm_name, "Unassigned PM");

    let due: Vec<i64> = bundle.tasks.iter().map(|t| (t.due_at - T0) / SECS_PER_DAY).collect();
    assert_eq!(due, vec![0, 30, 60]);
    assert!(bundle.tasks.iter().all(|t| t.status == TASK_STATUS_TODO));

    let severities: Vec<&str> = bundle.risks.iter().map(|r| r.severity.as_str()).collect();
    assert_eq!(severities, vec!["medium", "high"]);

    let kpis: Vec<(f64, f64, f64)> = bundle
        .kpis
        .iter()
        .map(|k| (k.baseline, k.target, k.current))
        .collect();
    assert_eq!(kpis, vec![(100.0, 75.0, 100.0), (60.0, 85.0, 60.0)]);
}

#[test]
fn test_configured_window_is_honoured() {
    let tmp = tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.provisioning.window_days = 120;
    config.provisioning.task_offsets_days = vec![7, 45, 100];
    config.provisioning.default_pm_name = "PMO".to_string();
    let h = harness(tmp.path(), config);
    let id = approved_idea(&h.ctx, "Long pilot");
    provision::provision_project(&h.ctx, &id, Some("   ")).unwrap();

    let bundle = provision::get_project(&h.ctx, &id).unwrap().unwrap();
    assert_eq!(bundle.project.end_at, T0 + 120 * SECS_PER_DAY);
    assert_eq!(bundle.project.pm_name, "PMO");
    let due: Vec<i64> = bundle.tasks.iter().map(|t| (t.due_at - T0) / SECS_PER_DAY).collect();
    assert_eq!(due, vec![7, 45, 100]);
}

#[test]
fn test_unapproved_idea_cannot_be_provisioned() {
    let tmp = tempdir().unwrap();
    let h = harness(tmp.path(), PipelineConfig::default());
    let id = ideas::submit_idea(
        &h.ctx,
        NewIdea {
            title: "Too early".to_string(),
            owner_id: "u-1".to_string(),
            ..Default::default()
        },
    )
    .unwrap()
    .id;
    let err = provision::provision_project(&h.ctx, &id, None).unwrap_err();
    assert!(matches!(err, PipelineError::ValidationError(_)));
    assert!(provision::get_project(&h.ctx, &id).unwrap().is_none());
}

#[test]
fn test_empty_project_shell_is_completed_on_retry() {
    let tmp = tempdir().unwrap();
    let h = harness(tmp.path(), PipelineConfig::default());
    let id = approved_idea(&h.ctx, "Interrupted run");

    // Simulate an interrupted writer that left only the project row behind.
    let conn = rusqlite::Connection::open(h.ctx.store.db_path()).unwrap();
    conn.execute(
        "INSERT INTO projects(id, idea_id, name, pm_name, status, progress, start_at, end_at, created_at)
         VALUES('P-SHELL', ?1, 'Interrupted run', 'Unassigned PM', 'planned', 0, ?2, ?3, ?2)",
        params![id, T0, T0 + 90 * SECS_PER_DAY],
    )
    .unwrap();

    let report = reconcile::reconcile(&h.ctx).unwrap();
    assert_eq!(report.incomplete_projects, vec!["P-SHELL".to_string()]);

    let outcome = provision::provision_project(&h.ctx, &id, None).unwrap();
    assert_eq!(outcome.project_id, "P-SHELL");
    assert!(!outcome.created);
    assert!(outcome.completed_existing);
    assert_eq!(count(&h.ctx, "projects"), 1);
    assert_eq!(count(&h.ctx, "project_tasks"), 3);
    assert!(
        h.audit
            .records()
            .iter()
            .any(|r| r.action == ACTION_PROJECT_COMPLETED && r.entity_id == "P-SHELL")
    );

    assert!(reconcile::reconcile(&h.ctx).unwrap().is_clean());
}

#[test]
fn test_concurrent_provisioning_creates_one_project() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    let h = harness(&root, PipelineConfig::default());
    let id = approved_idea(&h.ctx, "Race to provision");

    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let root = root.clone();
            let id = id.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let h = harness(&root, PipelineConfig::default());
                barrier.wait();
                provision::provision_project(&h.ctx, &id, None).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
    assert!(outcomes.iter().all(|o| o.project_id == outcomes[0].project_id));
    assert_eq!(count(&h.ctx, "projects"), 1);
    assert_eq!(count(&h.ctx, "project_tasks"), 3);
}

#[test]
fn test_oversized_window_is_refused_before_any_write() {
    let tmp = tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.provisioning.window_days = i64::MAX / 2;
    let res = PipelineContext::with_parts(
        Store::new(tmp.path()),
        config,
        Arc::new(FixedClock::new(T0)),
        Arc::new(MemoryAuditSink::new()),
    );
    assert!(matches!(res, Err(PipelineError::ValidationError(_))));
}
