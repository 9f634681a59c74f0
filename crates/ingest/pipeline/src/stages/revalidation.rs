use maple_ingest_types::{Envelope, RevalidationOutput, StageName, StagePayload};
use tracing::info;

use super::{drive, StageContext, StageLeft};
use crate::candidate::{pluck_revalidation, RevalidationCandidate};
use crate::config::CommitPolicy;
use crate::post_guard::decide_revalidation;
use crate::services::StageServices;
use crate::traits::IngestStage;

/// Stage 5: re-check the produced effects and direct Commit.
pub struct RevalidationStage {
    services: StageServices,
    policy: CommitPolicy,
}

impl RevalidationStage {
    pub fn new(services: StageServices, policy: CommitPolicy) -> Self {
        Self { services, policy }
    }

    fn decide(
        candidate: RevalidationCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<StagePayload, StageLeft> {
        let directive = decide_revalidation(&candidate).map_err(StageLeft::Semantic)?;
        info!(
            proposal_id = %directive.proposal_id,
            outcome = %directive.outcome,
            allow_list = directive.commit_allow_list.len(),
            "Revalidation directive issued"
        );
        Ok(StagePayload::Revalidation(RevalidationOutput {
            revalidation_id: ctx.mint_id(),
            directive,
        }))
    }
}

impl IngestStage for RevalidationStage {
    fn stage(&self) -> StageName {
        StageName::Revalidation
    }

    fn run(&self, envelope: Envelope) -> Envelope {
        drive(
            StageName::Revalidation,
            &self.services,
            envelope,
            |env| pluck_revalidation(env, &self.policy),
            Self::decide,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::stages::test_support::{envelope, raw_proposal, services};
    use crate::stages::{ExecutionStage, IntakeStage, PlanningStage, ValidationStage};
    use maple_ingest_types::{codes, CommitOutcome};
    use serde_json::{json, Value};

    fn executed(raw: Value) -> Envelope {
        let env = IntakeStage::new(services()).run(envelope(raw));
        let env = ValidationStage::new(services(), ValidationConfig::default()).run(env);
        let env = PlanningStage::new(services()).run(env);
        ExecutionStage::new(services()).run(env)
    }

    fn with_event() -> Value {
        json!({
            "actor": "alice",
            "title": "note and event",
            "operations": [
                {"op": "create_artifact", "object_id": "note_1", "kind": "note"},
                {"op": "emit_event", "event_name": "note.created"}
            ]
        })
    }

    #[test]
    fn artifact_only_run_approves() {
        let out = RevalidationStage::new(services(), CommitPolicy::default())
            .run(executed(raw_proposal()));
        let directive = &out.revalidation().unwrap().directive;
        assert_eq!(directive.outcome, CommitOutcome::ApproveCommit);
        assert_eq!(out.revalidation().unwrap().revalidation_id, "reval_1");
    }

    #[test]
    fn events_force_partial_with_provisional_artifacts() {
        let out = RevalidationStage::new(services(), CommitPolicy::default())
            .run(executed(with_event()));
        let directive = &out.revalidation().unwrap().directive;
        assert_eq!(directive.outcome, CommitOutcome::PartialCommit);
        assert_eq!(directive.commit_allow_list, vec!["note_1"]);
    }

    #[test]
    fn full_only_policy_halts_on_events() {
        let out = RevalidationStage::new(services(), CommitPolicy::full_only())
            .run(executed(with_event()));
        assert_eq!(out.errors().len(), 1);
        assert_eq!(out.errors()[0].code, codes::PARTIAL_NOT_ALLOWED);
        assert_eq!(out.errors()[0].trace.as_ref().unwrap()["mode"], "PARTIAL");
        assert!(!out.has_run(StageName::Revalidation));
    }
}
