//! Outbox protocol: pure transitions, the ledger that keeps entries, and the
//! applier loop that moves them from decided to applied.

pub mod applier;
pub mod ledger;
pub mod transitions;

pub use applier::{
    drive_batch, drive_entry, DriveOutcome, EffectHandler, LedgerApplier, OutboxApplier,
};
pub use ledger::{OutboxFilter, OutboxLedger, OutboxRecord, OutboxTransition};
pub use transitions::{
    can_retry, mark_applied, mark_failed, mark_in_progress, mark_pending, requeue_for_retry,
    RetryOptions,
};
