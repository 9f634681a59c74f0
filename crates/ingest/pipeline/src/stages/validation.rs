use maple_ingest_types::{
    codes, Envelope, StageName, StagePayload, ValidationCheck, ValidationOutput,
};
use serde_json::json;
use tracing::debug;

use super::{drive, StageContext, StageLeft};
use crate::candidate::{pluck_validation, ValidationCandidate};
use crate::config::ValidationConfig;
use crate::post_guard::SemanticFailure;
use crate::services::StageServices;
use crate::traits::IngestStage;

pub const ACTOR_MATCHES_SNAPSHOT: &str = "ACTOR_MATCHES_SNAPSHOT";
pub const SUBMIT_PERMISSION_HELD: &str = "SUBMIT_PERMISSION_HELD";
pub const ARTIFACT_KINDS_IN_SCOPE: &str = "ARTIFACT_KINDS_IN_SCOPE";

/// Stage 2: check the proposal against the capability snapshot.
pub struct ValidationStage {
    services: StageServices,
    config: ValidationConfig,
}

impl ValidationStage {
    pub fn new(services: StageServices, config: ValidationConfig) -> Self {
        Self { services, config }
    }

    fn checks(&self, candidate: &ValidationCandidate) -> Vec<(&'static str, ValidationCheck)> {
        let snapshot = &candidate.snapshot;
        let proposal = &candidate.proposal;

        let actor_ok = proposal.actor == snapshot.permissions.actor;
        let permission_ok = snapshot.allows(&self.config.submit_permission);
        let out_of_scope: Vec<&str> = proposal
            .artifact_kinds()
            .filter(|k| !snapshot.kind_allowed(k))
            .collect();

        vec![
            (
                ACTOR_MATCHES_SNAPSHOT,
                ValidationCheck {
                    rule: ACTOR_MATCHES_SNAPSHOT.into(),
                    passed: actor_ok,
                    detail: format!(
                        "proposal actor {}, snapshot actor {}",
                        proposal.actor, snapshot.permissions.actor
                    ),
                },
            ),
            (
                SUBMIT_PERMISSION_HELD,
                ValidationCheck {
                    rule: SUBMIT_PERMISSION_HELD.into(),
                    passed: permission_ok,
                    detail: format!("requires {}", self.config.submit_permission),
                },
            ),
            (
                ARTIFACT_KINDS_IN_SCOPE,
                ValidationCheck {
                    rule: ARTIFACT_KINDS_IN_SCOPE.into(),
                    passed: out_of_scope.is_empty(),
                    detail: if out_of_scope.is_empty() {
                        "all artifact kinds allowed".into()
                    } else {
                        format!("kinds not in scope: {}", out_of_scope.join(", "))
                    },
                },
            ),
        ]
    }

    fn decide(
        &self,
        candidate: ValidationCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<StagePayload, StageLeft> {
        let checks = self.checks(&candidate);
        for (_, check) in &checks {
            debug!(rule = %check.rule, passed = check.passed, "Validation check");
        }

        let failed: Vec<&'static str> = checks
            .iter()
            .filter(|(_, c)| !c.passed)
            .map(|(rule, _)| *rule)
            .collect();
        if !failed.is_empty() {
            let details: Vec<&str> = checks
                .iter()
                .filter(|(_, c)| !c.passed)
                .map(|(_, c)| c.detail.as_str())
                .collect();
            return Err(StageLeft::Semantic(
                SemanticFailure::new(
                    StageName::Validation,
                    codes::PROPOSAL_NOT_PERMITTED,
                    format!(
                        "proposal {} not permitted: {}",
                        candidate.proposal_id,
                        details.join("; ")
                    ),
                    failed.clone(),
                )
                .with_detail(json!({
                    "proposalId": candidate.proposal_id,
                    "actor": candidate.proposal.actor,
                    "failedRules": failed,
                })),
            ));
        }

        Ok(StagePayload::Validation(ValidationOutput {
            validation_id: ctx.mint_id(),
            actor: candidate.proposal.actor,
            invariants_version: candidate.snapshot.invariants_version,
            checks: checks.into_iter().map(|(_, c)| c).collect(),
        }))
    }
}

impl IngestStage for ValidationStage {
    fn stage(&self) -> StageName {
        StageName::Validation
    }

    fn run(&self, envelope: Envelope) -> Envelope {
        drive(
            StageName::Validation,
            &self.services,
            envelope,
            pluck_validation,
            |candidate, ctx| self.decide(candidate, ctx),
        )
    }
}
