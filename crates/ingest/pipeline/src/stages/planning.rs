use std::collections::HashSet;

use maple_ingest_types::{codes, Envelope, PlanOutput, PlanStep, StageName, StagePayload};
use serde::Serialize;
use serde_json::json;

use super::{drive, StageContext, StageLeft};
use crate::candidate::{pluck_planning, PlanningCandidate};
use crate::post_guard::SemanticFailure;
use crate::services::StageServices;
use crate::traits::{Fingerprinter, IngestStage};

/// Content-derived step id: equal operations within a proposal share one.
fn fingerprint_step<T: Serialize>(
    fingerprinter: &dyn Fingerprinter,
    proposal_id: &str,
    operation: &T,
) -> Result<String, SemanticFailure> {
    let operation = serde_json::to_value(operation).map_err(|e| {
        SemanticFailure::new(
            StageName::Planning,
            codes::PLAN_STEP_UNSERIALIZABLE,
            format!("operation of {} cannot be fingerprinted: {}", proposal_id, e),
            [codes::PLAN_STEP_UNSERIALIZABLE],
        )
    })?;
    Ok(fingerprinter.fingerprint(&json!({
        "proposalId": proposal_id,
        "operation": operation,
    })))
}

/// Stage 3: order the validated operations into plan steps.
pub struct PlanningStage {
    services: StageServices,
}

impl PlanningStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }

    fn decide(
        candidate: PlanningCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<StagePayload, StageLeft> {
        let mut seen = HashSet::new();
        let mut steps = Vec::new();
        for operation in candidate.proposal.operations {
            let step_id = fingerprint_step(
                ctx.services.fingerprinter.as_ref(),
                &candidate.proposal_id,
                &operation,
            )
            .map_err(StageLeft::Semantic)?;
            // identical operations collapse into one step
            if !seen.insert(step_id.clone()) {
                continue;
            }
            steps.push(PlanStep {
                step_id,
                index: steps.len(),
                operation,
            });
        }

        Ok(StagePayload::Planning(PlanOutput {
            plan_id: ctx.mint_id(),
            steps,
        }))
    }
}

impl IngestStage for PlanningStage {
    fn stage(&self) -> StageName {
        StageName::Planning
    }

    fn run(&self, envelope: Envelope) -> Envelope {
        drive(
            StageName::Planning,
            &self.services,
            envelope,
            pluck_planning,
            Self::decide,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::stages::test_support::{envelope, raw_proposal, services};
    use crate::stages::{IntakeStage, ValidationStage};
    use serde_json::{json, Value};

    fn planned(raw: Value) -> Envelope {
        let env = IntakeStage::new(services()).run(envelope(raw));
        let env = ValidationStage::new(services(), ValidationConfig::default()).run(env);
        PlanningStage::new(services()).run(env)
    }

    #[test]
    fn one_step_per_operation_in_order() {
        let out = planned(raw_proposal());
        let plan = out.plan().unwrap();
        assert_eq!(plan.plan_id, "plan_1");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].index, 1);
        assert_ne!(plan.steps[0].step_id, plan.steps[1].step_id);
    }

    #[test]
    fn identical_operations_collapse() {
        let raw = json!({
            "actor": "alice",
            "title": "ping twice",
            "operations": [
                {"op": "emit_event", "event_name": "ping"},
                {"op": "emit_event", "event_name": "ping"},
                {"op": "create_artifact", "object_id": "note_1", "kind": "note"}
            ]
        });
        let plan = planned(raw).plan().cloned().unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].index, 1);
    }

    #[test]
    fn distinct_passthrough_operations_keep_distinct_steps() {
        let raw = json!({
            "actor": "alice",
            "title": "two opaque ops",
            "operations": [
                {"op": "other", "raw": {"name": "a"}},
                {"op": "other", "raw": {"name": "b"}}
            ]
        });
        let plan = planned(raw).plan().cloned().unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_ne!(plan.steps[0].step_id, plan.steps[1].step_id);
    }

    #[test]
    fn unserializable_operation_has_no_step_id() {
        use crate::services::Blake3Fingerprinter;
        use std::collections::BTreeMap;

        // non-string map keys cannot become JSON
        let operation: BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let failure = fingerprint_step(&Blake3Fingerprinter, "prop_1", &operation).unwrap_err();
        assert_eq!(failure.stage, StageName::Planning);
        assert_eq!(failure.code, codes::PLAN_STEP_UNSERIALIZABLE);
        assert!(fingerprint_step(&Blake3Fingerprinter, "prop_1", &json!({"op": "other"})).is_ok());
    }

    #[test]
    fn halted_validation_blocks_planning() {
        let raw = json!({
            "actor": "mallory",
            "title": "t",
            "operations": [{"op": "create_artifact", "object_id": "n", "kind": "note"}]
        });
        let out = planned(raw);
        assert_eq!(out.errors().len(), 1);
        assert!(!out.has_run(StageName::Planning));
    }
}
