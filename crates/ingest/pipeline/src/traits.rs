use chrono::{DateTime, Utc};
use maple_ingest_types::{Effect, Envelope, Snapshot, StageName};
use serde_json::Value;

use crate::candidate::{ContractViolation, StageCandidate};
use crate::trust::{PromotionRejection, PromotionRequest};

/// IngestStage trait: one of the six pipeline stages.
///
/// A stage is total: it never fails out-of-band. Failure is an error
/// appended to the returned envelope.
pub trait IngestStage: Send + Sync {
    /// Which stage this is.
    fn stage(&self) -> StageName;

    /// Run the stage over an envelope and return the next envelope.
    fn run(&self, envelope: Envelope) -> Envelope;
}

/// Structural contract checker.
///
/// Validates a plucked candidate against a named schema and returns it
/// (possibly normalized) or the list of violations.
pub trait ContractChecker: Send + Sync {
    fn validate(
        &self,
        schema: &str,
        candidate: StageCandidate,
    ) -> Result<StageCandidate, Vec<ContractViolation>>;
}

/// Source of the point-in-time capability snapshot consumed by Validation.
pub trait SnapshotProvider: Send + Sync {
    fn snapshot(&self) -> Snapshot;
}

/// Mints unique ids with a stable prefix per kind, e.g. `commit_<opaque>`.
pub trait IdProvider: Send + Sync {
    fn new_id(&self, kind: &str) -> String;
}

/// Deterministic content fingerprint; equal structure yields equal output
/// regardless of key order.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, value: &Value) -> String;
}

/// Wall clock, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Trust promotion policy consulted by Commit for each eligible effect.
///
/// A rejection moves that one effect to `rejected`; the commit still records.
pub trait PromotionPolicy: Send + Sync {
    fn check(&self, effect: &Effect, request: &PromotionRequest) -> Result<(), PromotionRejection>;
}
