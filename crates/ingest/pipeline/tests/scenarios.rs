//! End-to-end scenarios: commit decisions over hand-staged envelopes, the
//! full ingest path into an outbox ledger, and retry gating.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use maple_ingest_pipeline::*;
use maple_ingest_types::*;
use serde_json::{json, Value};
use tokio::sync::RwLock;

fn services() -> StageServices {
    StageServices::standard()
        .with_ids(Arc::new(SequentialIdProvider::new()))
        .with_clock(Arc::new(FixedClock::default()))
}

/// Envelope where Execution and Revalidation already ran with the given outputs.
fn staged(effects: Vec<Effect>, outcome: CommitOutcome, allow: &[&str]) -> Envelope {
    let at = Utc::now();
    let mut env = Envelope::for_proposal("prop_1", json!({}));
    env.record_stage(StageRun {
        ran_at: at,
        observed: vec![],
        payload: StagePayload::Execution(ExecutionOutput {
            execution_id: "exec_1".into(),
            effects_log: EffectsLog::new("prop_1", effects),
        }),
    })
    .unwrap();
    env.record_stage(StageRun {
        ran_at: at,
        observed: vec![],
        payload: StagePayload::Revalidation(RevalidationOutput {
            revalidation_id: "reval_1".into(),
            directive: RevalidationDirective {
                proposal_id: "prop_1".into(),
                outcome,
                commit_allow_list: allow.iter().map(|s| s.to_string()).collect(),
                rules_applied: vec![],
            },
        }),
    })
    .unwrap();
    env
}

fn note(id: &str, trust: TrustLevel) -> Effect {
    Effect::artifact("prop_1", id, "note", trust)
}

fn raw_notes() -> Value {
    json!({
        "actor": "alice",
        "title": "Add notes",
        "operations": [
            {"op": "create_artifact", "object_id": "note_1", "kind": "note"},
            {"op": "create_artifact", "object_id": "note_2", "kind": "note"}
        ]
    })
}

fn commit_stage() -> CommitStage {
    CommitStage::new(services(), "proposal-ingest")
}

#[test]
fn full_commit_rejects_already_committed_effect() {
    let env = staged(
        vec![
            note("x", TrustLevel::Provisional),
            note("y", TrustLevel::Committed),
            note("z", TrustLevel::Provisional),
        ],
        CommitOutcome::ApproveCommit,
        &["x"],
    );
    let out = commit_stage().run(env);
    assert!(out.errors().is_empty());

    let record = out.commit().unwrap();
    let approved: Vec<&str> = record
        .effects
        .approved
        .iter()
        .filter_map(Effect::object_id)
        .collect();
    assert_eq!(approved, vec!["x", "z"]);
    assert_eq!(record.effects.rejected.len(), 1);
    assert_eq!(record.effects.rejected[0].code, codes::NOT_PROVISIONAL);
    assert_eq!(record.effects.rejected[0].effect.object_id(), Some("y"));

    assert_eq!(record.outbox.len(), 2);
    assert!(record.outbox.iter().all(|o| o.status == OutboxStatus::Pending));
    assert_eq!(record.justification.mode, CommitMode::Full);
    assert_eq!(
        record.justification.rules_applied,
        vec![codes::FULL_IGNORES_ALLOWLIST.to_string()]
    );
}

#[test]
fn partial_commit_with_unknown_object_halts() {
    let env = staged(
        vec![note("note_1", TrustLevel::Provisional)],
        CommitOutcome::PartialCommit,
        &["note_1", "ghost_id"],
    );
    let out = commit_stage().run(env);

    assert!(!out.has_run(StageName::Commit));
    assert_eq!(out.ids().get(IdKey::CommitId), None);
    let halt = out.first_halt().unwrap();
    assert_eq!(halt.stage, StageName::Commit);
    assert_eq!(halt.code, codes::ALLOWLIST_UNKNOWN_OBJECT);
    let trace = halt.trace.as_ref().unwrap();
    assert_eq!(trace["detail"]["unknownObjectIds"], json!(["ghost_id"]));
}

#[test]
fn partial_commit_with_empty_list_commits_nothing() {
    let env = staged(
        vec![
            note("x", TrustLevel::Provisional),
            Effect::event("prop_1", "note.created", None, TrustLevel::Provisional),
        ],
        CommitOutcome::PartialCommit,
        &[],
    );
    let out = commit_stage().run(env);
    assert!(out.errors().is_empty());

    let record = out.commit().unwrap();
    assert!(record.effects.approved.is_empty());
    assert!(record.promotions.is_empty());
    assert!(record.outbox.is_empty());
    assert_eq!(record.effects.ignored.len(), 2);
    assert!(record
        .effects
        .ignored
        .iter()
        .all(|i| i.reason == codes::PARTIAL_EMPTY_ALLOWLIST));
}

#[test]
fn partial_commit_keeps_only_listed_artifacts() {
    let env = staged(
        vec![
            note("x", TrustLevel::Provisional),
            note("z", TrustLevel::Provisional),
            Effect::event("prop_1", "note.created", None, TrustLevel::Provisional),
        ],
        CommitOutcome::PartialCommit,
        &["z"],
    );
    let record = commit_stage().run(env).commit().cloned().unwrap();

    assert_eq!(record.effects.approved.len(), 1);
    assert_eq!(record.effects.approved[0].object_id(), Some("z"));
    assert_eq!(record.effects.rejected[0].code, codes::NOT_ALLOWLIST_OBJECT);
    assert_eq!(record.effects.ignored[0].reason, codes::NON_ARTIFACT_EFFECT);
    assert_eq!(record.outbox.len(), 1);
}

#[test]
fn denied_promotion_still_records_the_commit() {
    let env = staged(
        vec![
            note("x", TrustLevel::Provisional),
            note("y", TrustLevel::Provisional),
            note("z", TrustLevel::Provisional),
        ],
        CommitOutcome::ApproveCommit,
        &[],
    );
    let stage = CommitStage::new(
        services().with_promotion(Arc::new(DenyingPolicy::for_objects(&["y"]))),
        "proposal-ingest",
    );
    let out = stage.run(env);
    assert!(out.errors().is_empty());
    assert!(out.has_run(StageName::Commit));

    let record = out.commit().unwrap();
    let approved: Vec<&str> = record
        .effects
        .approved
        .iter()
        .filter_map(Effect::object_id)
        .collect();
    assert_eq!(approved, vec!["x", "z"]);
    assert_eq!(record.effects.rejected.len(), 1);
    assert_eq!(record.effects.rejected[0].effect.object_id(), Some("y"));
    assert_eq!(record.effects.rejected[0].code, DenyingPolicy::CODE);
    assert_eq!(record.effects.rejected[0].message, "promotion of y denied");

    let queued: Vec<&str> = record
        .outbox
        .iter()
        .filter_map(|o| o.effect.object_id())
        .collect();
    assert_eq!(queued, vec!["x", "z"]);
    assert_eq!(record.promotions.len(), 2);
}

#[test]
fn retry_is_gated_by_attempts() {
    let entry = OutboxEntry::pending(
        "outbox_1",
        "key-1",
        "proposal-ingest",
        StageName::Commit,
        note("x", TrustLevel::Committed),
        Utc::now(),
    );
    let options = RetryOptions::default();
    let failure = |n: u32| OutboxErrorRecord {
        message: format!("attempt {} failed", n),
        trace: None,
        at: Utc::now(),
    };

    let once = mark_failed(&entry, failure(1), Some(options.max_attempts));
    let twice = mark_failed(&once, failure(2), Some(options.max_attempts));
    assert_eq!(twice.attempts, 2);
    assert!(can_retry(&twice, &options));

    let requeued = requeue_for_retry(&twice, &options, Utc::now()).unwrap();
    assert_eq!(requeued.status, OutboxStatus::Pending);
    assert!(requeued.error.is_none());
    assert_eq!(requeued.last_error.as_ref().unwrap().message, "attempt 2 failed");

    let thrice = mark_failed(&twice, failure(3), Some(options.max_attempts));
    assert_eq!(thrice.attempts, 3);
    assert!(!can_retry(&thrice, &options));
    assert!(requeue_for_retry(&thrice, &options, Utc::now()).is_none());
}

#[tokio::test]
async fn ingest_then_drain_applies_every_entry() {
    let pipeline = IngestPipeline::standard(PipelineConfig::default(), services()).unwrap();
    let report = pipeline.ingest(
        "prop_1",
        raw_notes(),
        &StaticSnapshotProvider::permitting("alice", &["note"]),
    );
    assert!(report.committed());

    let mut ledger = OutboxLedger::new();
    let appended = ledger
        .append_commit(report.envelope.commit().unwrap())
        .unwrap();
    assert_eq!(appended, 2);

    let applier = LedgerApplier::new(
        Arc::new(RwLock::new(ledger)),
        RecordingHandler::new(),
        Arc::new(FixedClock::default()),
        pipeline.config().outbox.max_attempts,
    );
    let outcomes = applier.drain().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| matches!(o, DriveOutcome::Applied(_))));
    assert_eq!(applier.handler().applied().len(), 2);

    let ledger = applier.ledger().read().await;
    let applied = ledger.query(&OutboxFilter::new().with_status(OutboxStatus::Applied));
    assert_eq!(applied.len(), 2);
    assert!(ledger.pending().is_empty());

    // Draining again finds nothing to do.
    drop(ledger);
    assert!(applier.drain().await.is_empty());
}

#[tokio::test]
async fn failed_entry_is_retried_after_requeue() {
    let pipeline = IngestPipeline::standard(PipelineConfig::default(), services()).unwrap();
    let report = pipeline.ingest(
        "prop_1",
        raw_notes(),
        &StaticSnapshotProvider::permitting("alice", &["note"]),
    );
    let mut ledger = OutboxLedger::new();
    ledger
        .append_commit(report.envelope.commit().unwrap())
        .unwrap();

    let applier = LedgerApplier::new(
        Arc::new(RwLock::new(ledger)),
        FlakyHandler::failing_first(1),
        Arc::new(FixedClock::default()),
        3,
    );
    let first = applier.drain().await;
    let failed: Vec<OutboxEntry> = first
        .iter()
        .filter_map(|o| match o {
            DriveOutcome::Failed(e) => Some(e.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 1);
    assert_eq!(failed[0].error.as_ref().unwrap().message, "handler unavailable");

    let requeued = requeue_for_retry(&failed[0], &RetryOptions::default(), Utc::now()).unwrap();
    applier
        .ledger()
        .write()
        .await
        .record_transition(requeued)
        .unwrap();

    let second = applier.drain().await;
    assert_eq!(second.len(), 1);
    assert!(matches!(second[0], DriveOutcome::Applied(_)));
    assert_eq!(applier.handler().calls(), 3);

    let ledger = applier.ledger().read().await;
    let history = ledger.history(&failed[0].outbox_id).unwrap();
    let path: Vec<OutboxStatus> = history.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![
            OutboxStatus::InProgress,
            OutboxStatus::Failed,
            OutboxStatus::Pending,
            OutboxStatus::InProgress,
            OutboxStatus::Applied,
        ]
    );
}

#[test]
fn config_file_drives_commit_policy() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
pipeline_name = "notes-ingest"

[commit_policy]
allowed_modes = ["FULL"]
"#
    )
    .unwrap();
    let config = PipelineConfig::load(Some(file.path())).unwrap();
    let pipeline = IngestPipeline::standard(config, services()).unwrap();

    let mixed = json!({
        "actor": "alice",
        "title": "note and event",
        "operations": [
            {"op": "create_artifact", "object_id": "note_1", "kind": "note"},
            {"op": "emit_event", "event_name": "note.created"}
        ]
    });
    let report = pipeline.ingest(
        "prop_1",
        mixed,
        &StaticSnapshotProvider::permitting("alice", &["note"]),
    );
    assert_eq!(report.envelope.first_halt().unwrap().code, codes::PARTIAL_NOT_ALLOWED);

    let report = pipeline.ingest(
        "prop_2",
        raw_notes(),
        &StaticSnapshotProvider::permitting("alice", &["note"]),
    );
    assert!(report.committed());
    assert!(report.outbox.iter().all(|o| o.pipeline == "notes-ingest"));
}

#[test]
fn contract_rejection_halts_with_stage_code() {
    let services = services().with_checker(Arc::new(RejectingChecker::for_schema("ingest.planning.v1")));
    let pipeline = IngestPipeline::standard(PipelineConfig::default(), services).unwrap();
    let report = pipeline.ingest(
        "prop_1",
        raw_notes(),
        &StaticSnapshotProvider::permitting("alice", &["note"]),
    );

    let halt = report.envelope.first_halt().unwrap();
    assert_eq!(halt.stage, StageName::Planning);
    assert_eq!(halt.code, "INVALID_PLANNING_INPUT");
    assert_eq!(
        halt.trace.as_ref().unwrap()["rulesApplied"],
        json!(["PLANNING_INPUT_PARSE_FAILED"])
    );
    assert!(report.envelope.has_run(StageName::Validation));
    assert!(!report.envelope.has_run(StageName::Planning));
    assert_eq!(report.envelope.errors().len(), 1);
}

#[test]
fn ledger_queries_by_pipeline_and_proposal() {
    let snapshots = StaticSnapshotProvider::permitting("alice", &["note"]);
    let pipeline = IngestPipeline::standard(PipelineConfig::default(), services()).unwrap();
    let mut ledger = OutboxLedger::new();
    for id in ["prop_1", "prop_2"] {
        let report = pipeline.ingest(id, raw_notes(), &snapshots);
        ledger.append_commit(report.envelope.commit().unwrap()).unwrap();
    }

    let by_pipeline = OutboxFilter::new().with_pipeline("proposal-ingest");
    assert_eq!(ledger.query(&by_pipeline).len(), 4);
    let by_proposal = by_pipeline.with_proposal("prop_2");
    assert_eq!(ledger.query(&by_proposal).len(), 2);
    assert!(ledger
        .query(&OutboxFilter::new().with_pipeline("elsewhere"))
        .is_empty());
}
