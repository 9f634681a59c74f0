use maple_ingest_types::{Envelope, IntakeOutput, StageName, StagePayload};
use serde_json::json;

use super::{drive, StageContext, StageLeft};
use crate::candidate::{pluck_intake, IntakeCandidate};
use crate::services::StageServices;
use crate::traits::IngestStage;

/// Stage 1: parse the raw proposal and fingerprint it.
pub struct IntakeStage {
    services: StageServices,
}

impl IntakeStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }

    fn decide(
        candidate: IntakeCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<StagePayload, StageLeft> {
        let fingerprint = ctx.services.fingerprinter.fingerprint(&json!({
            "proposalId": candidate.proposal_id,
            "raw": candidate.raw,
        }));
        Ok(StagePayload::Intake(IntakeOutput {
            intake_id: ctx.mint_id(),
            fingerprint,
            proposal: candidate.proposal,
        }))
    }
}

impl IngestStage for IntakeStage {
    fn stage(&self) -> StageName {
        StageName::Intake
    }

    fn run(&self, envelope: Envelope) -> Envelope {
        drive(
            StageName::Intake,
            &self.services,
            envelope,
            pluck_intake,
            Self::decide,
        )
    }
}
