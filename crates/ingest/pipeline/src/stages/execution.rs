use maple_ingest_types::{
    Effect, EffectKind, EffectsLog, Envelope, ExecutionOutput, Operation, StageName,
    StagePayload, TrustLevel,
};
use tracing::warn;

use super::{drive, StageContext, StageLeft};
use crate::candidate::{pluck_execution, ExecutionCandidate};
use crate::services::StageServices;
use crate::traits::IngestStage;
use crate::trust::{promote, PromotionRequest};

/// Stage 4: materialize plan steps into effects.
///
/// Effects are born UNTRUSTED. Artifacts and events are raised to
/// PROVISIONAL through the promotion guard; unclassified operations stay
/// UNTRUSTED and are later rejected by Commit.
pub struct ExecutionStage {
    services: StageServices,
}

impl ExecutionStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }

    fn effect_kind(operation: Operation) -> EffectKind {
        match operation {
            Operation::CreateArtifact {
                object_id, kind, ..
            } => EffectKind::Artifact { object_id, kind },
            Operation::EmitEvent {
                event_name,
                payload,
            } => EffectKind::Event {
                event_name,
                payload,
            },
            Operation::Other { raw } => EffectKind::Unknown { raw },
        }
    }

    fn decide(
        candidate: ExecutionCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<StagePayload, StageLeft> {
        let proposal_id = candidate.proposal_id;
        let effects = candidate
            .plan
            .steps
            .into_iter()
            .map(|step| {
                let effect = Effect::new(
                    &proposal_id,
                    Self::effect_kind(step.operation),
                    TrustLevel::Untrusted,
                );
                if matches!(effect.kind, EffectKind::Unknown { .. }) {
                    return effect;
                }
                let request = PromotionRequest::new(
                    effect.trust,
                    TrustLevel::Provisional,
                    StageName::Execution,
                    "executed plan step",
                );
                match promote(&request) {
                    Ok(()) => effect.with_trust(TrustLevel::Provisional),
                    Err(rejection) => {
                        warn!(
                            stable_id = %effect.stable_id,
                            code = rejection.code,
                            "Execution promotion rejected"
                        );
                        effect
                    }
                }
            })
            .collect();

        Ok(StagePayload::Execution(ExecutionOutput {
            execution_id: ctx.mint_id(),
            effects_log: EffectsLog::new(proposal_id, effects),
        }))
    }
}

impl IngestStage for ExecutionStage {
    fn stage(&self) -> StageName {
        StageName::Execution
    }

    fn run(&self, envelope: Envelope) -> Envelope {
        drive(
            StageName::Execution,
            &self.services,
            envelope,
            pluck_execution,
            Self::decide,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::stages::test_support::{envelope, services};
    use crate::stages::{IntakeStage, PlanningStage, ValidationStage};
    use maple_ingest_types::IdKey;
    use serde_json::json;

    fn executed() -> Envelope {
        let raw = json!({
            "actor": "alice",
            "title": "mixed",
            "operations": [
                {"op": "create_artifact", "object_id": "note_1", "kind": "note"},
                {"op": "emit_event", "event_name": "note.created"},
                {"op": "other", "raw": {"shell": "rm"}}
            ]
        });
        let env = IntakeStage::new(services()).run(envelope(raw));
        let env = ValidationStage::new(services(), ValidationConfig::default()).run(env);
        let env = PlanningStage::new(services()).run(env);
        ExecutionStage::new(services()).run(env)
    }

    #[test]
    fn artifacts_and_events_become_provisional() {
        let out = executed();
        assert!(out.errors().is_empty());
        let log = &out.execution().unwrap().effects_log;

        assert_eq!(log.proposal_id, "prop_1");
        let trust: Vec<TrustLevel> = log.effects.iter().map(|e| e.trust).collect();
        assert_eq!(
            trust,
            vec![
                TrustLevel::Provisional,
                TrustLevel::Provisional,
                TrustLevel::Untrusted
            ]
        );
        assert_eq!(out.ids().get(IdKey::ExecutionId), Some("exec_1"));
    }

    #[test]
    fn stable_ids_are_deterministic() {
        let a = executed();
        let b = executed();
        let ids = |e: &Envelope| -> Vec<String> {
            e.execution()
                .unwrap()
                .effects_log
                .effects
                .iter()
                .map(|x| x.stable_id.clone())
                .collect()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn observed_records_plan_dependency() {
        let out = executed();
        let run = out.stage_run(StageName::Execution).unwrap();
        let keys: Vec<IdKey> = run.observed.iter().map(|o| o.key).collect();
        assert_eq!(keys, vec![IdKey::ProposalId, IdKey::PlanId]);
    }
}
