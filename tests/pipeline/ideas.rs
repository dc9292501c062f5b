use ideaflow::core::audit::{JsonlAuditSink, MemoryAuditSink, read_audit_log};
use ideaflow::core::config::PipelineConfig;
use ideaflow::core::error::PipelineError;
use ideaflow::core::state_machine::IdeaState;
use ideaflow::core::store::Store;
use ideaflow::core::time::FixedClock;
use ideaflow::pipeline::PipelineContext;
use ideaflow::pipeline::ideas::{self, ACTION_SUBMITTED, NewIdea};
use ideaflow::pipeline::reconcile;
use ideaflow::pipeline::transition::{TransitionRequest, apply_transition};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

const T0: i64 = 1_700_000_000;

fn new_idea(title: &str) -> NewIdea {
    NewIdea {
        title: title.to_string(),
        description: "Pilot in one region first".to_string(),
        owner_id: "u-7".to_string(),
        owner_name: "Sam".to_string(),
    }
}

#[test]
fn test_submit_records_creation_event() {
    let tmp = tempdir().unwrap();
    let audit = Arc::new(MemoryAuditSink::new());
    let ctx = PipelineContext::with_parts(
        Store::new(tmp.path()),
        PipelineConfig::default(),
        Arc::new(FixedClock::new(T0)),
        audit.clone(),
    )
    .unwrap();

    let idea = ideas::submit_idea(&ctx, new_idea("  Solar carports  ")).unwrap();
    assert_eq!(idea.title, "Solar carports");
    assert_eq!(idea.state, IdeaState::IdeaSubmitted);
    assert_eq!(idea.created_at, T0);
    assert!(idea.latest_ai_score.is_none());

    let stored = ideas::get_idea(&ctx, &idea.id).unwrap();
    assert_eq!(stored, idea);

    let history = ideas::lifecycle_history(&ctx, &idea.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_state, None);
    assert_eq!(history[0].to_state, IdeaState::IdeaSubmitted);
    assert_eq!(history[0].action, ACTION_SUBMITTED);
    assert_eq!(history[0].actor_id, "u-7");

    let records = audit.records_for(&idea.id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, ACTION_SUBMITTED);
}

#[test]
fn test_submit_validation() {
    let tmp = tempdir().unwrap();
    let ctx = PipelineContext::with_parts(
        Store::new(tmp.path()),
        PipelineConfig::default(),
        Arc::new(FixedClock::new(T0)),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();

    let err = ideas::submit_idea(&ctx, new_idea("   ")).unwrap_err();
    assert!(matches!(err, PipelineError::ValidationError(_)));

    let mut no_owner = new_idea("Ownerless");
    no_owner.owner_id = String::new();
    assert!(ideas::submit_idea(&ctx, no_owner).is_err());

    assert!(ideas::list_ideas(&ctx, None).unwrap().is_empty());
    assert!(matches!(
        ideas::get_idea(&ctx, "missing"),
        Err(PipelineError::NotFound(_))
    ));
    assert!(matches!(
        ideas::lifecycle_history(&ctx, "missing"),
        Err(PipelineError::NotFound(_))
    ));
}

#[test]
fn test_list_filters_by_state() {
    let tmp = tempdir().unwrap();
    let ctx = PipelineContext::with_parts(
        Store::new(tmp.path()),
        PipelineConfig::default(),
        Arc::new(FixedClock::new(T0)),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();

    let a = ideas::submit_idea(&ctx, new_idea("A")).unwrap();
    let b = ideas::submit_idea(&ctx, new_idea("B")).unwrap();
    apply_transition(
        &ctx,
        &TransitionRequest::new(&b.id, IdeaState::Rejected, "admin-1", "admin"),
    )
    .unwrap();

    assert_eq!(ideas::list_ideas(&ctx, None).unwrap().len(), 2);
    let submitted = ideas::list_ideas(&ctx, Some(IdeaState::IdeaSubmitted)).unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].id, a.id);
    let rejected = ideas::list_ideas(&ctx, Some(IdeaState::Rejected)).unwrap();
    assert_eq!(rejected[0].id, b.id);
}

#[test]
fn test_stage_durations_follow_the_clock() {
    let tmp = tempdir().unwrap();
    let clock = Arc::new(FixedClock::new(T0));
    let ctx = PipelineContext::with_parts(
        Store::new(tmp.path()),
        PipelineConfig::default(),
        clock.clone(),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();

    let id = ideas::submit_idea(&ctx, new_idea("Timed")).unwrap().id;
    clock.advance(3_600);
    apply_transition(
        &ctx,
        &TransitionRequest::new(&id, IdeaState::AiRefined, "admin-1", "admin"),
    )
    .unwrap();
    clock.advance(7_200);
    apply_transition(
        &ctx,
        &TransitionRequest::new(&id, IdeaState::TeamFormed, "admin-1", "admin"),
    )
    .unwrap();
    clock.advance(60);

    let events = ideas::lifecycle_history(&ctx, &id).unwrap();
    let durations = ideas::stage_durations(&events, ctx.now());
    let secs: Vec<i64> = durations.iter().map(|d| d.duration_secs).collect();
    assert_eq!(secs, vec![3_600, 7_200, 60]);
    let states: Vec<IdeaState> = durations.iter().map(|d| d.state).collect();
    assert_eq!(
        states,
        vec![IdeaState::IdeaSubmitted, IdeaState::AiRefined, IdeaState::TeamFormed]
    );
    assert!(durations[2].open);
}

#[test]
fn test_same_second_events_keep_insertion_order() {
    let tmp = tempdir().unwrap();
    let ctx = PipelineContext::with_parts(
        Store::new(tmp.path()),
        PipelineConfig::default(),
        Arc::new(FixedClock::new(T0)),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();
    let id = ideas::submit_idea(&ctx, new_idea("Fast mover")).unwrap().id;
    for to in [IdeaState::AiRefined, IdeaState::TeamFormed, IdeaState::PrototypeReady] {
        apply_transition(&ctx, &TransitionRequest::new(&id, to, "admin-1", "admin")).unwrap();
    }
    let order: Vec<IdeaState> = ideas::lifecycle_history(&ctx, &id)
        .unwrap()
        .into_iter()
        .map(|e| e.to_state)
        .collect();
    assert_eq!(
        order,
        vec![
            IdeaState::IdeaSubmitted,
            IdeaState::AiRefined,
            IdeaState::TeamFormed,
            IdeaState::PrototypeReady
        ]
    );
}

#[test]
fn test_open_wires_config_and_jsonl_audit() {
    let tmp = tempdir().unwrap();
    fs::write(
        tmp.path().join("pipeline.toml"),
        "[audit]\nlog_file = \"logs/audit.jsonl\"\n\n[provisioning]\nwindow_days = 60\ntask_offsets_days = [0, 20, 40]\n",
    )
    .unwrap();

    let ctx = PipelineContext::open(tmp.path()).unwrap();
    assert_eq!(ctx.config.provisioning.window_days, 60);
    assert_eq!(ctx.config.provisioning.default_pm_name, "Unassigned PM");

    let idea = ideas::submit_idea(&ctx, new_idea("Logged")).unwrap();
    let records = read_audit_log(&tmp.path().join("logs/audit.jsonl")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_id, idea.id);

    let sink = JsonlAuditSink::new(tmp.path().join("other.jsonl"));
    assert!(read_audit_log(sink.path()).unwrap().is_empty());
}

#[test]
fn test_reconcile_reports_drift_and_missing_projects() {
    let tmp = tempdir().unwrap();
    let ctx = PipelineContext::with_parts(
        Store::new(tmp.path()),
        PipelineConfig::default(),
        Arc::new(FixedClock::new(T0)),
        Arc::new(MemoryAuditSink::new()),
    )
    .unwrap();
    let healthy = ideas::submit_idea(&ctx, new_idea("Healthy")).unwrap().id;
    let drifted = ideas::submit_idea(&ctx, new_idea("Drifted")).unwrap().id;
    assert!(reconcile::reconcile(&ctx).unwrap().is_clean());

    // Bypass the engine: state jumps with no lifecycle event and no project.
    let conn = rusqlite::Connection::open(ctx.store.db_path()).unwrap();
    conn.execute(
        "UPDATE ideas SET state = 'approved_for_execution' WHERE id = ?1",
        [&drifted],
    )
    .unwrap();

    let report = reconcile::reconcile(&ctx).unwrap();
    assert_eq!(report.ideas_scanned, 2);
    assert_eq!(report.state_drift.len(), 1);
    assert_eq!(report.state_drift[0].idea_id, drifted);
    assert_eq!(report.state_drift[0].idea_state, IdeaState::ApprovedForExecution);
    assert_eq!(report.state_drift[0].last_event_state, Some(IdeaState::IdeaSubmitted));
    assert_eq!(report.missing_projects, vec![drifted.clone()]);
    assert!(!report.missing_projects.contains(&healthy));
}
