//! Pure outbox state transitions. Each returns a new entry; the input is untouched.

use chrono::{DateTime, Utc};
use maple_ingest_types::{OutboxEntry, OutboxErrorRecord, OutboxStatus};
use serde::{Deserialize, Serialize};

/// Retry budget consulted by [`can_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    pub max_attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

pub fn mark_in_progress(entry: &OutboxEntry, now: DateTime<Utc>) -> OutboxEntry {
    OutboxEntry {
        status: OutboxStatus::InProgress,
        error: None,
        updated_at: now,
        ..entry.clone()
    }
}

/// Clears both `error` and `last_error`.
pub fn mark_applied(entry: &OutboxEntry, applied_at: DateTime<Utc>) -> OutboxEntry {
    OutboxEntry {
        status: OutboxStatus::Applied,
        applied_at: Some(applied_at),
        error: None,
        last_error: None,
        updated_at: applied_at,
        ..entry.clone()
    }
}

/// Counts an attempt, clamped at `max_attempts` when given.
pub fn mark_failed(
    entry: &OutboxEntry,
    error: OutboxErrorRecord,
    max_attempts: Option<u32>,
) -> OutboxEntry {
    let attempts = entry.attempts.saturating_add(1);
    let attempts = match max_attempts {
        Some(max) => attempts.min(max),
        None => attempts,
    };
    OutboxEntry {
        status: OutboxStatus::Failed,
        attempts,
        updated_at: error.at,
        error: Some(error.clone()),
        last_error: Some(error),
        ..entry.clone()
    }
}

/// Back to PENDING; `last_error` is kept.
pub fn mark_pending(entry: &OutboxEntry, now: DateTime<Utc>) -> OutboxEntry {
    OutboxEntry {
        status: OutboxStatus::Pending,
        error: None,
        updated_at: now,
        ..entry.clone()
    }
}

pub fn can_retry(entry: &OutboxEntry, options: &RetryOptions) -> bool {
    entry.status == OutboxStatus::Failed && entry.attempts < options.max_attempts
}

/// `can_retry` then `mark_pending`. Scheduling the retry is the caller's business.
pub fn requeue_for_retry(
    entry: &OutboxEntry,
    options: &RetryOptions,
    now: DateTime<Utc>,
) -> Option<OutboxEntry> {
    can_retry(entry, options).then(|| mark_pending(entry, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_ingest_types::{Effect, StageName, TrustLevel};

    fn entry() -> OutboxEntry {
        OutboxEntry::pending(
            "outbox_1",
            "blake3:key",
            "proposal-ingest",
            StageName::Commit,
            Effect::artifact("prop_1", "note_1", "note", TrustLevel::Committed),
            Utc::now(),
        )
    }

    fn failure(message: &str) -> OutboxErrorRecord {
        OutboxErrorRecord {
            message: message.into(),
            trace: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn full_lifecycle_keeps_invariants() {
        let pending = entry();
        let running = mark_in_progress(&pending, Utc::now());
        assert_eq!(running.status, OutboxStatus::InProgress);
        assert!(running.check_invariants().is_ok());

        let failed = mark_failed(&running, failure("timeout"), None);
        assert_eq!(failed.status, OutboxStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.check_invariants().is_ok());

        let retried = mark_pending(&failed, Utc::now());
        assert!(retried.error.is_none());
        assert_eq!(retried.last_error.as_ref().unwrap().message, "timeout");
        assert!(retried.check_invariants().is_ok());

        let applied = mark_applied(&mark_in_progress(&retried, Utc::now()), Utc::now());
        assert_eq!(applied.status, OutboxStatus::Applied);
        assert!(applied.applied_at.is_some());
        assert!(applied.last_error.is_none());
        assert_eq!(applied.attempts, 1);
        assert!(applied.check_invariants().is_ok());

        // input values are never modified
        assert_eq!(pending.status, OutboxStatus::Pending);
    }

    #[test]
    fn failed_attempts_clamp_at_max() {
        let mut e = entry();
        e.attempts = 3;
        let failed = mark_failed(&e, failure("again"), Some(3));
        assert_eq!(failed.attempts, 3);
        assert_eq!(mark_failed(&e, failure("again"), None).attempts, 4);
    }

    #[test]
    fn retry_gating() {
        let opts = RetryOptions { max_attempts: 3 };
        let mut failed = mark_failed(&entry(), failure("x"), None);
        failed.attempts = 2;
        assert!(can_retry(&failed, &opts));
        failed.attempts = 3;
        assert!(!can_retry(&failed, &opts));

        // only FAILED entries are retried
        assert!(!can_retry(&entry(), &opts));
    }

    #[test]
    fn requeue_returns_pending_only_when_allowed() {
        let failed = mark_failed(&entry(), failure("x"), None);
        let requeued = requeue_for_retry(&failed, &RetryOptions::default(), Utc::now()).unwrap();
        assert_eq!(requeued.status, OutboxStatus::Pending);

        let exhausted = OutboxEntry {
            attempts: 3,
            ..failed
        };
        assert!(requeue_for_retry(&exhausted, &RetryOptions::default(), Utc::now()).is_none());
    }
}
