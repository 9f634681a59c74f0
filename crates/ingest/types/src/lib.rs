//! Core type definitions for the proposal ingestion pipeline.
//!
//! No business logic: the envelope threaded through the six stages, the
//! trust lattice, effects, per-stage payloads and the outbox entry wire shape.
//! `maple-ingest-pipeline` holds the guards, stages and outbox protocol.

pub mod canonical;
pub mod effect;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod outbox;
pub mod payload;
pub mod proposal;
pub mod snapshot;
pub mod stage;
pub mod trust;

pub use canonical::{canonical_json, fingerprint, fingerprint_of};
pub use effect::{Effect, EffectKind, EffectsLog};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, StagePayload, StageResult, StageRun};
pub use error::{codes, ErrorRecord, Severity, ShapeError};
pub use ids::{IdKey, ObservedId, PipelineIds};
pub use outbox::{OutboxEntry, OutboxErrorRecord, OutboxStatus};
pub use payload::{
    CommitEffects, CommitMode, CommitOutcome, CommitRecord, ExecutionOutput, IgnoredEffect,
    IntakeOutput, Justification, PlanOutput, PlanStep, PromotionRecord, RejectedEffect,
    RevalidationDirective, RevalidationOutput, ValidationCheck, ValidationOutput,
};
pub use proposal::{Operation, Proposal};
pub use snapshot::{Permissions, Scope, Snapshot};
pub use stage::StageName;
pub use trust::TrustLevel;
