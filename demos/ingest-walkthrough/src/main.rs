//! Proposal Ingestion Walkthrough
//!
//! Carries proposals through the six guarded stages and drains the resulting
//! outbox. Nothing is applied until Commit has decided it, and nothing Commit
//! decided is lost if applying fails.
//!
//! ## Scenarios
//!
//! 1. Artifact-only proposal: APPROVE_COMMIT, every effect committed
//! 2. Unpermitted actor: Validation halts, later stages are no-ops
//! 3. Mixed proposal: PARTIAL_COMMIT, the event is ignored
//! 4. FULL-only policy: Revalidation refuses the partial commit
//! 5. Outbox drain with a flaky handler and one retry

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use colored::Colorize;
use maple_ingest_pipeline::{
    requeue_for_retry, ApplyError, Clock, CommitPolicy, DriveOutcome, EffectHandler, FlakyHandler,
    IngestPipeline, IngestReport, LedgerApplier, OutboxLedger, PipelineConfig, RetryOptions,
    StageServices, StaticSnapshotProvider, SystemClock,
};
use maple_ingest_types::{OutboxEntry, StageName};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn header(title: &str) {
    println!();
    println!("{}", "═".repeat(72).cyan());
    println!("  {}", title.cyan().bold());
    println!("{}", "═".repeat(72).cyan());
}

/// Prints each effect it is asked to apply.
struct PrintingHandler;

#[async_trait]
impl EffectHandler for PrintingHandler {
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), ApplyError> {
        println!(
            "  {}   applying {} ({})",
            "│".dimmed(),
            entry.effect.object_id().unwrap_or("-").yellow(),
            entry.outbox_id.dimmed()
        );
        Ok(())
    }
}

fn notes_proposal() -> Value {
    json!({
        "actor": "alice",
        "title": "Add meeting notes",
        "operations": [
            {"op": "create_artifact", "object_id": "note_standup", "kind": "note"},
            {"op": "create_artifact", "object_id": "note_retro", "kind": "note"}
        ]
    })
}

fn mixed_proposal() -> Value {
    json!({
        "actor": "alice",
        "title": "Add note and announce it",
        "operations": [
            {"op": "create_artifact", "object_id": "note_launch", "kind": "note"},
            {"op": "emit_event", "event_name": "note.created"}
        ]
    })
}

fn print_report(report: &IngestReport) {
    for stage in StageName::ALL {
        let mark = if report.envelope.has_run(stage) {
            "ran".green()
        } else {
            "skipped".dimmed()
        };
        println!("  {}   {:<13} {}", "│".dimmed(), stage.to_string(), mark);
    }
    match report.envelope.first_halt() {
        Some(halt) => println!(
            "  {} Halted at {}: {} ({})",
            "└".dimmed(),
            halt.stage,
            halt.code.red().bold(),
            halt.message
        ),
        None => {
            if let Some(record) = report.envelope.commit() {
                println!(
                    "  {} {} approved={} rejected={} ignored={} outbox={}",
                    "└".dimmed(),
                    record.justification.outcome.as_str().green().bold(),
                    record.effects.approved.len(),
                    record.effects.rejected.len(),
                    record.effects.ignored.len(),
                    record.outbox.len()
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = PipelineConfig::load(std::env::args().nth(1).as_deref().map(std::path::Path::new))
        .context("loading pipeline config")?;
    let snapshots = StaticSnapshotProvider::permitting("alice", &["note"]);
    let pipeline = IngestPipeline::standard(config.clone(), StageServices::standard())
        .context("building pipeline")?;
    let ledger = Arc::new(RwLock::new(OutboxLedger::new()));

    // ── Scenario 1 ──────────────────────────────────────────────────
    header("Scenario 1: Artifact-only proposal (APPROVE_COMMIT)");
    let report = pipeline.ingest("prop_notes", notes_proposal(), &snapshots);
    print_report(&report);
    if let Some(record) = report.envelope.commit() {
        ledger.write().await.append_commit(record)?;
    }

    // ── Scenario 2 ──────────────────────────────────────────────────
    header("Scenario 2: Unpermitted actor (Validation halts)");
    let report = pipeline.ingest(
        "prop_bob",
        json!({
            "actor": "bob",
            "title": "Edit someone else's notes",
            "operations": [{"op": "create_artifact", "object_id": "note_bob", "kind": "note"}]
        }),
        &snapshots,
    );
    print_report(&report);

    // ── Scenario 3 ──────────────────────────────────────────────────
    header("Scenario 3: Mixed proposal (PARTIAL_COMMIT)");
    let report = pipeline.ingest("prop_mixed", mixed_proposal(), &snapshots);
    print_report(&report);
    if let Some(record) = report.envelope.commit() {
        for ignored in &record.effects.ignored {
            println!(
                "  {}   ignored {} ({})",
                " ".dimmed(),
                ignored.effect.kind.label(),
                ignored.reason.yellow()
            );
        }
        ledger.write().await.append_commit(record)?;
    }

    // ── Scenario 4 ──────────────────────────────────────────────────
    header("Scenario 4: FULL-only commit policy");
    let strict = IngestPipeline::standard(
        PipelineConfig {
            commit_policy: CommitPolicy::full_only(),
            ..config.clone()
        },
        StageServices::standard(),
    )?;
    let report = strict.ingest("prop_strict", mixed_proposal(), &snapshots);
    print_report(&report);

    // ── Scenario 5 ──────────────────────────────────────────────────
    header("Scenario 5: Outbox drain");
    let applier = LedgerApplier::new(
        ledger.clone(),
        PrintingHandler,
        Arc::new(SystemClock),
        config.outbox.max_attempts,
    );
    let outcomes = applier.drain().await;
    println!(
        "  {} Applied {} entries",
        "└".dimmed(),
        outcomes
            .iter()
            .filter(|o| matches!(o, DriveOutcome::Applied(_)))
            .count()
            .to_string()
            .green()
    );

    let flaky_ledger = Arc::new(RwLock::new(OutboxLedger::new()));
    let report = pipeline.ingest("prop_retry", notes_proposal(), &snapshots);
    if let Some(record) = report.envelope.commit() {
        flaky_ledger.write().await.append_commit(record)?;
    }
    let flaky = LedgerApplier::new(
        flaky_ledger,
        FlakyHandler::failing_first(1),
        Arc::new(SystemClock),
        config.outbox.max_attempts,
    );
    let retry = RetryOptions {
        max_attempts: config.outbox.max_attempts,
    };
    for outcome in flaky.drain().await {
        if let DriveOutcome::Failed(entry) = outcome {
            println!(
                "  {}   {} failed (attempt {}), requeueing",
                "│".dimmed(),
                entry.outbox_id,
                entry.attempts
            );
            if let Some(next) = requeue_for_retry(&entry, &retry, SystemClock.now()) {
                flaky.ledger().write().await.record_transition(next)?;
            }
        }
    }
    let retried = flaky.drain().await;
    println!(
        "  {} Retried {} entries after {} handler calls",
        "└".dimmed(),
        retried.len().to_string().green(),
        flaky.handler().calls()
    );

    println!();
    Ok(())
}
