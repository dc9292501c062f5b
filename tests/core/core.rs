use ideaflow::core::audit::{
    AuditRecord, AuditSink, JsonlAuditSink, read_audit_log, record_best_effort,
};
use ideaflow::core::broker::DbBroker;
use ideaflow::core::config::{self, PipelineConfig};
use ideaflow::core::db;
use ideaflow::core::error::PipelineError;
use ideaflow::core::schemas;
use ideaflow::core::scoring::{HumanAggregation, ScoreRow, weighted_average};
use ideaflow::core::state_machine::{self, IdeaState};
use ideaflow::core::time::{Clock, FixedClock, SystemClock};
use std::fs;
use tempfile::tempdir;

#[test]
fn state_machine_table_is_closed_and_forward_only() {
    let mut allowed = 0;
    for from in IdeaState::ALL {
        for to in IdeaState::ALL {
            let ok = state_machine::can_transition(from, to);
            assert_eq!(ok, state_machine::can_transition_str(from.as_str(), to.as_str()));
            if ok {
                allowed += 1;
                assert!(to > from, "{from} -> {to} must move forward");
            }
        }
    }
    assert_eq!(allowed, 15);

    for bad in ["", "approved", "IDEA_SUBMITTED", "human-judged"] {
        assert!(!state_machine::can_transition_str(bad, "ai_refined"));
        assert!(!state_machine::can_transition_str("idea_submitted", bad));
    }
}

#[test]
fn state_names_round_trip_through_storage_form() {
    for state in IdeaState::ALL {
        let parsed: IdeaState = state.as_str().parse().unwrap();
        assert_eq!(parsed, state);
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, format!("\"{}\"", state.as_str()));
    }
    assert!(matches!(
        "shipped".parse::<IdeaState>(),
        Err(PipelineError::ValidationError(_))
    ));
}

#[test]
fn weighted_average_edge_cases() {
    assert_eq!(weighted_average(&[]), 0.0);
    assert_eq!(
        weighted_average(&[
            ScoreRow { score: 90.0, weight: 0.0 },
            ScoreRow { score: 10.0, weight: 0.0 },
        ]),
        0.0
    );
    assert_eq!(
        weighted_average(&[
            ScoreRow { score: 80.0, weight: 50.0 },
            ScoreRow { score: 60.0, weight: 50.0 },
        ]),
        70.0
    );
    assert_eq!(
        weighted_average(&[
            ScoreRow { score: 90.0, weight: 60.0 },
            ScoreRow { score: 70.0, weight: 40.0 },
        ]),
        82.0
    );
    assert_eq!(
        weighted_average(&[
            ScoreRow { score: 100.0, weight: 1.0 },
            ScoreRow { score: 0.0, weight: 2.0 },
        ]),
        33.33
    );
}

#[test]
fn config_defaults_and_overrides() {
    let tmp = tempdir().unwrap();
    let defaults = config::load_config(tmp.path()).unwrap();
    assert_eq!(defaults, PipelineConfig::default());
    assert_eq!(defaults.provisioning.window_days, 90);
    assert_eq!(defaults.provisioning.task_offsets_days, vec![0, 30, 60]);
    assert_eq!(defaults.judging.human_aggregation, HumanAggregation::AllRows);
    assert_eq!(defaults.audit.log_file, "audit.events.jsonl");

    fs::write(
        config::config_path(tmp.path()),
        "[judging]\nhuman_aggregation = \"latest_per_evaluator\"\nstrength_threshold = 80.0\n",
    )
    .unwrap();
    let loaded = config::load_config(tmp.path()).unwrap();
    assert_eq!(loaded.judging.human_aggregation, HumanAggregation::LatestPerEvaluator);
    assert_eq!(loaded.judging.strength_threshold, 80.0);
    assert_eq!(loaded.judging.weakness_threshold, 60.0);

    fs::write(config::config_path(tmp.path()), "[judging\nbroken").unwrap();
    assert!(matches!(
        config::load_config(tmp.path()),
        Err(PipelineError::ValidationError(_))
    ));

    fs::write(
        config::config_path(tmp.path()),
        "[provisioning]\nwindow_days = 30\ntask_offsets_days = [0, 30, 60]\n",
    )
    .unwrap();
    assert!(config::load_config(tmp.path()).is_err());
}

#[test]
fn schema_is_idempotent_and_versioned() {
    let tmp = tempdir().unwrap();
    let path = db::initialize_pipeline_db(tmp.path()).unwrap();
    assert_eq!(path, tmp.path().join(schemas::PIPELINE_DB_NAME));
    db::initialize_pipeline_db(tmp.path()).unwrap();

    let broker = DbBroker::new(&path);
    let (version, tables): (String, i64) = broker
        .with_conn("inspect", |conn| {
            let version = conn.query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )?;
            let tables = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('ideas', 'lifecycle_events', 'judging_criteria', 'evaluations',
                              'projects', 'project_tasks', 'project_risks', 'project_kpis')",
                [],
                |r| r.get(0),
            )?;
            Ok((version, tables))
        })
        .unwrap();
    assert_eq!(version, schemas::PIPELINE_SCHEMA_VERSION.to_string());
    assert_eq!(tables, 8);
}

#[test]
fn projects_are_unique_per_idea_at_the_storage_level() {
    let tmp = tempdir().unwrap();
    let path = db::initialize_pipeline_db(tmp.path()).unwrap();
    let broker = DbBroker::new(&path);
    let res = broker.with_conn("dup", |conn| {
        conn.execute(
            "INSERT INTO ideas(id, title, state, owner_id, created_at, updated_at)
             VALUES('i1', 't', 'approved_for_execution', 'u', 0, 0)",
            [],
        )?;
        for pid in ["p1", "p2"] {
            conn.execute(
                "INSERT INTO projects(id, idea_id, name, pm_name, status, start_at, end_at, created_at)
                 VALUES(?1, 'i1', 't', 'pm', 'planned', 0, 0, 0)",
                [pid],
            )?;
        }
        Ok(())
    });
    assert!(matches!(res, Err(PipelineError::RusqliteError(_))));
}

struct Unwritable;

impl AuditSink for Unwritable {
    fn record(&self, _record: &AuditRecord) -> Result<(), PipelineError> {
        Err(PipelineError::PersistenceError("read-only volume".to_string()))
    }
}

#[test]
fn audit_jsonl_appends_and_failures_are_swallowed() {
    let tmp = tempdir().unwrap();
    let sink = JsonlAuditSink::new(tmp.path().join("nested/audit.jsonl"));
    for n in 0..3 {
        record_best_effort(
            &sink,
            AuditRecord::new(
                n,
                "system",
                "TEST",
                "idea",
                &format!("i{n}"),
                serde_json::json!({ "n": n }),
            ),
        );
    }
    let records = read_audit_log(sink.path()).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].entity_id, "i2");
    assert_eq!(records[1].metadata["n"], 1);

    record_best_effort(
        &Unwritable,
        AuditRecord::new(0, "system", "TEST", "idea", "i9", serde_json::Value::Null),
    );
}

#[test]
fn clocks() {
    let fixed = FixedClock::new(1_000);
    fixed.advance(500);
    assert_eq!(fixed.now(), 1_500);
    fixed.set(10);
    assert_eq!(fixed.now(), 10);
    assert!(SystemClock.now() > 1_600_000_000);
}
