use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use maple_ingest_types::{OutboxEntry, OutboxErrorRecord, OutboxStatus};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ledger::OutboxLedger;
use super::transitions;
use crate::error::{ApplyError, OutboxError};
use crate::traits::Clock;

/// Boundary between decided and applied.
///
/// `apply` performs the real-world side effect; the `mark_*` calls persist
/// the corresponding transition and return the entry's new value.
#[async_trait]
pub trait OutboxApplier: Send + Sync {
    async fn apply(&self, entry: &OutboxEntry) -> Result<(), ApplyError>;

    async fn mark_in_progress(&self, entry: &OutboxEntry) -> Result<OutboxEntry, OutboxError>;

    async fn mark_applied(&self, entry: &OutboxEntry) -> Result<OutboxEntry, OutboxError>;

    async fn mark_failed(
        &self,
        entry: &OutboxEntry,
        error: OutboxErrorRecord,
    ) -> Result<OutboxEntry, OutboxError>;
}

/// Performs the side effect behind one outbox entry.
#[async_trait]
pub trait EffectHandler: Send + Sync {
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), ApplyError>;
}

/// Result of driving one entry.
#[derive(Clone, Debug, PartialEq)]
pub enum DriveOutcome {
    /// Not PENDING (or already visited in this batch); nothing was called.
    Skipped {
        outbox_id: String,
        status: OutboxStatus,
    },
    Applied(OutboxEntry),
    Failed(OutboxEntry),
    /// A `mark_*` call was refused for this entry.
    Errored {
        outbox_id: String,
        error: OutboxError,
    },
}

impl DriveOutcome {
    pub fn entry(&self) -> Option<&OutboxEntry> {
        match self {
            DriveOutcome::Applied(e) | DriveOutcome::Failed(e) => Some(e),
            DriveOutcome::Skipped { .. } | DriveOutcome::Errored { .. } => None,
        }
    }
}

/// Drive one entry: PENDING → IN_PROGRESS → APPLIED | FAILED.
///
/// Never retries; a FAILED entry waits for an external `requeue_for_retry`.
pub async fn drive_entry(
    applier: &dyn OutboxApplier,
    entry: &OutboxEntry,
    clock: &dyn Clock,
) -> Result<DriveOutcome, OutboxError> {
    if entry.status != OutboxStatus::Pending {
        debug!(outbox_id = %entry.outbox_id, status = %entry.status, "Outbox entry not pending");
        return Ok(DriveOutcome::Skipped {
            outbox_id: entry.outbox_id.clone(),
            status: entry.status,
        });
    }

    let running = applier.mark_in_progress(entry).await?;
    match applier.apply(&running).await {
        Ok(()) => {
            let applied = applier.mark_applied(&running).await?;
            info!(outbox_id = %applied.outbox_id, "Outbox entry applied");
            Ok(DriveOutcome::Applied(applied))
        }
        Err(e) => {
            let record = OutboxErrorRecord {
                message: e.message,
                trace: e.trace,
                at: clock.now(),
            };
            let failed = applier.mark_failed(&running, record).await?;
            warn!(
                outbox_id = %failed.outbox_id,
                attempts = failed.attempts,
                error = ?failed.error.as_ref().map(|err| err.message.as_str()),
                "Outbox entry failed"
            );
            Ok(DriveOutcome::Failed(failed))
        }
    }
}

/// Drive each distinct entry once, in order. Repeated outbox ids are skipped.
///
/// An entry whose transition is refused becomes `Errored`; the rest of the
/// batch still runs.
pub async fn drive_batch(
    applier: &dyn OutboxApplier,
    entries: &[OutboxEntry],
    clock: &dyn Clock,
) -> Vec<DriveOutcome> {
    let mut seen = HashSet::new();
    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.outbox_id.as_str()) {
            outcomes.push(DriveOutcome::Skipped {
                outbox_id: entry.outbox_id.clone(),
                status: entry.status,
            });
            continue;
        }
        let outcome = match drive_entry(applier, entry, clock).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(outbox_id = %entry.outbox_id, error = %error, "Outbox transition refused");
                DriveOutcome::Errored {
                    outbox_id: entry.outbox_id.clone(),
                    error,
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Applier that persists every transition into an [`OutboxLedger`].
pub struct LedgerApplier<H> {
    ledger: Arc<RwLock<OutboxLedger>>,
    handler: H,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl<H: EffectHandler> LedgerApplier<H> {
    pub fn new(
        ledger: Arc<RwLock<OutboxLedger>>,
        handler: H,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            ledger,
            handler,
            clock,
            max_attempts,
        }
    }

    pub fn ledger(&self) -> &Arc<RwLock<OutboxLedger>> {
        &self.ledger
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Drive every entry currently PENDING in the ledger.
    pub async fn drain(&self) -> Vec<DriveOutcome> {
        let pending = self.ledger.read().await.pending();
        drive_batch(self, &pending, self.clock.as_ref()).await
    }

    async fn persist(&self, next: OutboxEntry) -> Result<OutboxEntry, OutboxError> {
        self.ledger.write().await.record_transition(next.clone())?;
        Ok(next)
    }
}

#[async_trait]
impl<H: EffectHandler> OutboxApplier for LedgerApplier<H> {
    async fn apply(&self, entry: &OutboxEntry) -> Result<(), ApplyError> {
        self.handler.handle(entry).await
    }

    async fn mark_in_progress(&self, entry: &OutboxEntry) -> Result<OutboxEntry, OutboxError> {
        self.persist(transitions::mark_in_progress(entry, self.clock.now()))
            .await
    }

    async fn mark_applied(&self, entry: &OutboxEntry) -> Result<OutboxEntry, OutboxError> {
        self.persist(transitions::mark_applied(entry, self.clock.now()))
            .await
    }

    async fn mark_failed(
        &self,
        entry: &OutboxEntry,
        error: OutboxErrorRecord,
    ) -> Result<OutboxEntry, OutboxError> {
        self.persist(transitions::mark_failed(
            entry,
            error,
            Some(self.max_attempts),
        ))
        .await
    }
}
