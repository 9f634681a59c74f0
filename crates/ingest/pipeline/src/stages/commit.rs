use maple_ingest_types::{
    CommitRecord, Envelope, Justification, OutboxEntry, StageName, StagePayload,
};
use serde_json::json;
use tracing::info;

use super::{drive, StageContext, StageLeft};
use crate::candidate::{pluck_commit, CommitCandidate};
use crate::post_guard::decide_commit;
use crate::services::StageServices;
use crate::traits::IngestStage;

/// Stage 6: promote approved effects to COMMITTED and emit their outbox entries.
pub struct CommitStage {
    services: StageServices,
    pipeline_name: String,
}

impl CommitStage {
    pub fn new(services: StageServices, pipeline_name: impl Into<String>) -> Self {
        Self {
            services,
            pipeline_name: pipeline_name.into(),
        }
    }

    fn decide(
        &self,
        candidate: CommitCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<StagePayload, StageLeft> {
        let decision = decide_commit(&candidate, ctx.services.promotion.as_ref(), ctx.at)
            .map_err(StageLeft::Semantic)?;
        let commit_id = ctx.mint_id();

        let outbox: Vec<OutboxEntry> = decision
            .effects
            .approved
            .iter()
            .map(|effect| {
                let idempotency_key = ctx.services.fingerprinter.fingerprint(&json!({
                    "proposalId": candidate.proposal_id,
                    "stableId": effect.stable_id,
                }));
                OutboxEntry::pending(
                    ctx.services.ids.new_id("outbox"),
                    idempotency_key,
                    self.pipeline_name.as_str(),
                    StageName::Commit,
                    effect.clone(),
                    ctx.at,
                )
            })
            .collect();

        info!(
            proposal_id = %candidate.proposal_id,
            commit_id = %commit_id,
            outcome = %decision.outcome,
            approved = decision.effects.approved.len(),
            rejected = decision.effects.rejected.len(),
            ignored = decision.effects.ignored.len(),
            "Commit decided"
        );

        Ok(StagePayload::Commit(CommitRecord {
            commit_id,
            proposal_id: candidate.proposal_id,
            promotions: decision.promotions,
            effects: decision.effects,
            justification: Justification {
                mode: decision.mode,
                outcome: decision.outcome,
                rules_applied: decision.rules_applied,
            },
            outbox,
        }))
    }
}

impl IngestStage for CommitStage {
    fn stage(&self) -> StageName {
        StageName::Commit
    }

    fn run(&self, envelope: Envelope) -> Envelope {
        drive(
            StageName::Commit,
            &self.services,
            envelope,
            pluck_commit,
            |candidate, ctx| self.decide(candidate, ctx),
        )
    }
}
