//! Proposal Ingestion: six-stage guarded pipeline with a commit outbox.
//!
//! An untrusted proposal is carried through Intake, Validation, Planning,
//! Execution, Revalidation and Commit. Each stage reads earlier outputs from
//! the envelope, checks them, and writes exactly its own slot.
//!
//! ## Guarantees
//!
//! - **Fail closed**: once any HALT error is on the envelope, every stage is a no-op.
//! - **Write once**: a stage slot that has run is history and is never overwritten.
//! - **Errors are data**: Pre-Guard and stages append errors; Guard and
//!   Post-Guard only return them.
//! - **Trust only moves forward**: `UNTRUSTED < PROVISIONAL < COMMITTED < DERIVED`,
//!   and only Commit may produce COMMITTED.
//! - **Decided is not applied**: Commit emits one PENDING outbox entry per
//!   approved effect; an applier moves it to APPLIED or FAILED later.
//!
//! ## Stage skeleton
//!
//! 1. **HALT short-circuit**: envelope returned unchanged
//! 2. **Pre-Guard**: predecessor stages ran, required ids present
//! 3. **Guard**: pluck the typed candidate, validate via the contract checker
//! 4. **Post-Guard**: semantic rules (Revalidation, Commit)
//! 5. **Write**: mint the stage id, record the stage run

pub mod candidate;
pub mod checker;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod guard;
pub mod mocks;
pub mod outbox;
pub mod pipeline;
pub mod post_guard;
pub mod pre_guard;
pub mod services;
pub mod stages;
pub mod traits;
pub mod trust;

pub use candidate::{Candidate, ContractViolation, StageCandidate};
pub use checker::StructuralChecker;
pub use config::{CommitPolicy, OutboxConfig, PipelineConfig, ValidationConfig};
pub use error::{ApplyError, IngestError, OutboxError};
pub use guard::{Guard, GuardFailure, GuardTrace};
pub use mocks::{
    DenyingPolicy, FixedClock, FlakyHandler, RecordingHandler, RejectingChecker,
    SequentialIdProvider, StaticSnapshotProvider,
};
pub use outbox::{
    can_retry, drive_batch, drive_entry, mark_applied, mark_failed, mark_in_progress,
    mark_pending, requeue_for_retry, DriveOutcome, EffectHandler, LedgerApplier, OutboxApplier,
    OutboxFilter, OutboxLedger, RetryOptions,
};
pub use pipeline::{IngestPipeline, IngestReport};
pub use post_guard::{decide_commit, decide_revalidation, CommitDecision, SemanticFailure};
pub use pre_guard::{PreGuard, PrereqMissing};
pub use services::{Blake3Fingerprinter, StageServices, SystemClock, UuidIdProvider};
pub use stages::{
    CommitStage, ExecutionStage, IntakeStage, PlanningStage, RevalidationStage, StageLeft,
    ValidationStage,
};
pub use traits::{
    Clock, ContractChecker, Fingerprinter, IdProvider, IngestStage, PromotionPolicy,
    SnapshotProvider,
};
pub use trust::{promote, promote_value, LatticePolicy, PromotionRejection, PromotionRequest};
