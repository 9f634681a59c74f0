use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use maple_ingest_types::{Effect, OutboxEntry, Permissions, Scope, Snapshot};
use serde_json::json;

use crate::candidate::{ContractViolation, StageCandidate};
use crate::error::ApplyError;
use crate::outbox::EffectHandler;
use crate::traits::{Clock, ContractChecker, IdProvider, PromotionPolicy, SnapshotProvider};
use crate::trust::{promote, PromotionRejection, PromotionRequest};

/// Mock id provider for testing.
///
/// Counts per kind: `intake_1`, `intake_2`, `commit_1`, ...
#[derive(Debug, Default)]
pub struct SequentialIdProvider {
    counters: Mutex<HashMap<String, u64>>,
}

impl SequentialIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdProvider for SequentialIdProvider {
    fn new_id(&self, kind: &str) -> String {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let n = counters.entry(kind.to_string()).or_insert(0);
        *n += 1;
        format!("{}_{}", kind, n)
    }
}

/// Clock that always reads the same instant.
#[derive(Clone, Debug)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(Utc.timestamp_opt(1_767_225_600, 0).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Mock snapshot provider returning a fixed snapshot.
#[derive(Clone, Debug)]
pub struct StaticSnapshotProvider {
    snapshot: Snapshot,
}

impl StaticSnapshotProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// `actor` may submit proposals creating artifacts of `kinds`.
    pub fn permitting(actor: impl Into<String>, kinds: &[&str]) -> Self {
        Self::new(Snapshot {
            permissions: Permissions {
                actor: actor.into(),
                allow: vec!["proposal.submit".into()],
            },
            scope: Scope {
                allowed_kinds: kinds.iter().map(|k| k.to_string()).collect(),
            },
            invariants_version: "inv-1".into(),
            timestamp_ms: 1_767_225_600_000,
            dependency_versions: None,
        })
    }
}

impl SnapshotProvider for StaticSnapshotProvider {
    fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }
}

/// Mock checker that rejects every candidate of one schema.
#[derive(Clone, Debug)]
pub struct RejectingChecker {
    schema: String,
}

impl RejectingChecker {
    pub fn for_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }
}

impl ContractChecker for RejectingChecker {
    fn validate(
        &self,
        schema: &str,
        candidate: StageCandidate,
    ) -> Result<StageCandidate, Vec<ContractViolation>> {
        if schema == self.schema {
            Err(vec![ContractViolation::new("$", "rejected by mock checker")])
        } else {
            Ok(candidate)
        }
    }
}

/// Mock promotion policy that denies the listed object ids and otherwise
/// follows the lattice rules.
#[derive(Clone, Debug)]
pub struct DenyingPolicy {
    denied: Vec<String>,
}

impl DenyingPolicy {
    pub const CODE: &'static str = "PROMOTION_DENIED";

    pub fn for_objects(ids: &[&str]) -> Self {
        Self {
            denied: ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

impl PromotionPolicy for DenyingPolicy {
    fn check(&self, effect: &Effect, request: &PromotionRequest) -> Result<(), PromotionRejection> {
        match effect.object_id() {
            Some(id) if self.denied.iter().any(|d| d == id) => Err(PromotionRejection {
                code: Self::CODE,
                message: format!("promotion of {} denied", id),
            }),
            _ => promote(request),
        }
    }
}

/// Mock effect handler that records every applied outbox id.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    applied: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EffectHandler for RecordingHandler {
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), ApplyError> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.outbox_id.clone());
        Ok(())
    }
}

/// Mock effect handler that fails its first `n` calls, then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyHandler {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EffectHandler for FlakyHandler {
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), ApplyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ApplyError::new("handler unavailable").with_trace(json!({
                "outboxId": entry.outbox_id,
                "call": call + 1,
            })));
        }
        Ok(())
    }
}
