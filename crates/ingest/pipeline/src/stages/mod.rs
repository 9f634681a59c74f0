//! The six pipeline stages and the skeleton they share.
//!
//! Every stage runs the same chain: HALT short-circuit, Pre-Guard, Guard,
//! stage decision (Post-Guard where one exists), then a single write into
//! the stage's own slot. Each link returns `Result<_, StageLeft>`; the first
//! `Err` becomes one HALT error on the envelope.

pub mod commit;
pub mod execution;
pub mod intake;
pub mod planning;
pub mod revalidation;
pub mod validation;

use chrono::{DateTime, Utc};
use maple_ingest_types::{Envelope, IdKey, StageName, StagePayload, StageRun};
use tracing::{debug, info, warn};

use crate::candidate::{Candidate, ContractViolation};
use crate::dependencies;
use crate::guard::{Guard, GuardFailure};
use crate::post_guard::SemanticFailure;
use crate::pre_guard::{PreGuard, PrereqMissing};
use crate::services::StageServices;

pub use commit::CommitStage;
pub use execution::ExecutionStage;
pub use intake::IntakeStage;
pub use planning::PlanningStage;
pub use revalidation::RevalidationStage;
pub use validation::ValidationStage;

/// Why a stage stopped before writing its slot.
#[derive(Clone, Debug, PartialEq)]
pub enum StageLeft {
    Prereq(PrereqMissing),
    Guard(GuardFailure),
    Semantic(SemanticFailure),
}

/// What a stage decision sees besides its candidate.
pub struct StageContext<'a> {
    pub stage: StageName,
    pub services: &'a StageServices,
    pub at: DateTime<Utc>,
}

impl StageContext<'_> {
    /// Mint this stage's id, e.g. `plan_<opaque>`. Only called on success.
    pub fn mint_id(&self) -> String {
        self.services
            .ids
            .new_id(IdKey::minted_by(self.stage).id_kind())
    }
}

/// Run one stage over `envelope`. Total: failures come back as data.
pub(crate) fn drive<C, P, D>(
    stage: StageName,
    services: &StageServices,
    envelope: Envelope,
    pluck: P,
    decide: D,
) -> Envelope
where
    C: Candidate,
    P: FnOnce(&Envelope) -> Result<C, Vec<ContractViolation>>,
    D: FnOnce(C, &StageContext<'_>) -> Result<StagePayload, StageLeft>,
{
    if envelope.is_halted() {
        debug!(stage = %stage, "Envelope halted; stage skipped");
        return envelope;
    }
    if envelope.has_run(stage) {
        debug!(stage = %stage, "Stage already ran; output kept as history");
        return envelope;
    }

    let ctx = StageContext {
        stage,
        services,
        at: services.clock.now(),
    };
    let pre_guard = PreGuard::new(stage);

    let outcome = pre_guard
        .check(&envelope)
        .map_err(StageLeft::Prereq)
        .and_then(|()| {
            Guard::<C>::for_stage()
                .check(&envelope, services.checker.as_ref(), pluck)
                .map_err(StageLeft::Guard)
        })
        .and_then(|candidate| decide(candidate, &ctx));

    let mut envelope = envelope;
    match outcome {
        Ok(payload) => {
            let observed = envelope
                .ids()
                .observe(dependencies::for_stage(stage).required_ids);
            let minted = payload.minted_id().to_string();
            match envelope.record_stage(StageRun {
                ran_at: ctx.at,
                observed,
                payload,
            }) {
                Ok(()) => info!(stage = %stage, id = %minted, "Stage completed"),
                Err(e) => debug!(stage = %stage, error = %e, "Stage output refused"),
            }
        }
        Err(left) => {
            let record = match &left {
                StageLeft::Prereq(missing) => pre_guard.error_record(&envelope, missing, ctx.at),
                StageLeft::Guard(failure) => failure.to_error_record(ctx.at),
                StageLeft::Semantic(failure) => failure.to_error_record(ctx.at),
            };
            warn!(
                stage = %stage,
                code = %record.code,
                message = %record.message,
                "Stage halted pipeline"
            );
            envelope.push_error(record);
        }
    }
    envelope
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use maple_ingest_types::{Permissions, Scope, Snapshot};
    use serde_json::{json, Value};

    use super::*;
    use crate::mocks::{FixedClock, SequentialIdProvider};

    pub fn services() -> StageServices {
        StageServices::standard()
            .with_ids(Arc::new(SequentialIdProvider::new()))
            .with_clock(Arc::new(FixedClock::default()))
    }

    pub fn raw_proposal() -> Value {
        json!({
            "actor": "alice",
            "title": "Add notes",
            "operations": [
                {"op": "create_artifact", "object_id": "note_1", "kind": "note"},
                {"op": "create_artifact", "object_id": "note_2", "kind": "note"}
            ]
        })
    }

    pub fn snapshot() -> Snapshot {
        Snapshot {
            permissions: Permissions {
                actor: "alice".into(),
                allow: vec!["proposal.submit".into()],
            },
            scope: Scope {
                allowed_kinds: vec!["note".into()],
            },
            invariants_version: "inv-1".into(),
            timestamp_ms: 1_767_225_600_000,
            dependency_versions: None,
        }
    }

    pub fn envelope(raw: Value) -> Envelope {
        Envelope::for_proposal("prop_1", raw).with_snapshot(snapshot())
    }
}
