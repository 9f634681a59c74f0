use chrono::{DateTime, Utc};
use maple_ingest_types::{CommitRecord, OutboxEntry, OutboxStatus};
use serde::{Deserialize, Serialize};

use crate::error::OutboxError;

/// One status change recorded against an outbox entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxTransition {
    pub from: OutboxStatus,
    pub to: OutboxStatus,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

/// An outbox entry as held by the ledger: current value plus its history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub proposal_id: String,
    pub entry: OutboxEntry,
    pub transitions: Vec<OutboxTransition>,
}

/// Filter for querying the ledger.
#[derive(Clone, Debug, Default)]
pub struct OutboxFilter {
    pub status: Option<OutboxStatus>,
    pub proposal_id: Option<String>,
    pub pipeline: Option<String>,
}

impl OutboxFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: OutboxStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_proposal(mut self, proposal_id: impl Into<String>) -> Self {
        self.proposal_id = Some(proposal_id.into());
        self
    }

    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    pub fn matches(&self, record: &OutboxRecord) -> bool {
        if let Some(status) = self.status {
            if record.entry.status != status {
                return false;
            }
        }
        if let Some(ref proposal_id) = self.proposal_id {
            if record.proposal_id != *proposal_id {
                return false;
            }
        }
        if let Some(ref pipeline) = self.pipeline {
            if record.entry.pipeline != *pipeline {
                return false;
            }
        }
        true
    }
}

fn transition_allowed(from: OutboxStatus, to: OutboxStatus) -> bool {
    use OutboxStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (InProgress, Applied)
            | (InProgress, Failed)
            | (InProgress, Pending)
            | (Failed, Pending)
            | (Failed, InProgress)
    )
}

/// Outbox ledger: append-only record of every outbox entry.
///
/// Entries are never deleted. A transition replaces an entry's current value
/// and appends to its history; APPLIED is terminal.
#[derive(Debug, Default)]
pub struct OutboxLedger {
    records: Vec<OutboxRecord>,
}

impl OutboxLedger {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a new entry. Rejects duplicate outbox ids and idempotency keys.
    pub fn append(
        &mut self,
        proposal_id: impl Into<String>,
        entry: OutboxEntry,
    ) -> Result<(), OutboxError> {
        entry.check_invariants()?;
        self.check_unique(&entry)?;
        self.records.push(OutboxRecord {
            proposal_id: proposal_id.into(),
            entry,
            transitions: Vec::new(),
        });
        Ok(())
    }

    /// Append every outbox entry of a commit, or none of them.
    pub fn append_commit(&mut self, record: &CommitRecord) -> Result<usize, OutboxError> {
        for (i, entry) in record.outbox.iter().enumerate() {
            entry.check_invariants()?;
            self.check_unique(entry)?;
            let earlier = &record.outbox[..i];
            if earlier.iter().any(|e| e.outbox_id == entry.outbox_id) {
                return Err(OutboxError::DuplicateEntry(entry.outbox_id.clone()));
            }
            if earlier
                .iter()
                .any(|e| e.idempotency_key == entry.idempotency_key)
            {
                return Err(OutboxError::DuplicateIdempotencyKey(
                    entry.idempotency_key.clone(),
                ));
            }
        }
        for entry in &record.outbox {
            self.records.push(OutboxRecord {
                proposal_id: record.proposal_id.clone(),
                entry: entry.clone(),
                transitions: Vec::new(),
            });
        }
        Ok(record.outbox.len())
    }

    fn check_unique(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        for existing in &self.records {
            if existing.entry.outbox_id == entry.outbox_id {
                return Err(OutboxError::DuplicateEntry(entry.outbox_id.clone()));
            }
            if existing.entry.idempotency_key == entry.idempotency_key {
                return Err(OutboxError::DuplicateIdempotencyKey(
                    entry.idempotency_key.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Replace the current value of an existing entry with `next`.
    ///
    /// Identity fields must not change and the status move must be legal.
    pub fn record_transition(&mut self, next: OutboxEntry) -> Result<(), OutboxError> {
        next.check_invariants()?;
        let record = self
            .records
            .iter_mut()
            .find(|r| r.entry.outbox_id == next.outbox_id)
            .ok_or_else(|| OutboxError::NotFound(next.outbox_id.clone()))?;

        let from = record.entry.status;
        if !transition_allowed(from, next.status)
            || record.entry.idempotency_key != next.idempotency_key
        {
            return Err(OutboxError::InvalidTransition {
                outbox_id: next.outbox_id.clone(),
                from,
                to: next.status,
            });
        }

        record.transitions.push(OutboxTransition {
            from,
            to: next.status,
            attempts: next.attempts,
            at: next.updated_at,
        });
        record.entry = next;
        Ok(())
    }

    pub fn get(&self, outbox_id: &str) -> Option<&OutboxEntry> {
        self.history(outbox_id).map(|r| &r.entry)
    }

    pub fn history(&self, outbox_id: &str) -> Option<&OutboxRecord> {
        self.records.iter().find(|r| r.entry.outbox_id == outbox_id)
    }

    pub fn query(&self, filter: &OutboxFilter) -> Vec<&OutboxRecord> {
        self.records.iter().filter(|r| filter.matches(r)).collect()
    }

    /// Current values of all PENDING entries, in append order.
    pub fn pending(&self) -> Vec<OutboxEntry> {
        self.records
            .iter()
            .filter(|r| r.entry.status == OutboxStatus::Pending)
            .map(|r| r.entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
