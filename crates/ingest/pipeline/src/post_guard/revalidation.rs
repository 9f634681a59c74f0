use std::collections::HashSet;

use maple_ingest_types::{
    codes, CommitMode, CommitOutcome, RevalidationDirective, StageName, TrustLevel,
};
use serde_json::json;
use tracing::debug;

use super::SemanticFailure;
use crate::candidate::RevalidationCandidate;

/// Decide how (and whether) Commit may proceed.
///
/// Drift is a successful REJECT_COMMIT directive, not a failure. Non-artifact
/// effects force PARTIAL, which the commit policy must allow.
pub fn decide_revalidation(
    candidate: &RevalidationCandidate,
) -> Result<RevalidationDirective, SemanticFailure> {
    let proposal_id = candidate.proposal_id.clone();
    let log = &candidate.effects_log;

    if log.proposal_id != proposal_id {
        debug!(
            proposal_id = %proposal_id,
            effects_proposal_id = %log.proposal_id,
            "Effects log drifted from proposal"
        );
        return Ok(RevalidationDirective {
            proposal_id,
            outcome: CommitOutcome::RejectCommit,
            commit_allow_list: Vec::new(),
            rules_applied: vec![codes::DRIFT_DETECTED.into()],
        });
    }

    let non_artifacts: Vec<&str> = log
        .effects
        .iter()
        .filter(|e| !e.is_artifact())
        .map(|e| e.stable_id.as_str())
        .collect();

    if non_artifacts.is_empty() {
        return Ok(RevalidationDirective {
            proposal_id,
            outcome: CommitOutcome::ApproveCommit,
            commit_allow_list: Vec::new(),
            rules_applied: vec![codes::ALL_ARTIFACT_EFFECTS.into()],
        });
    }

    if !candidate.commit_policy.allows(CommitMode::Partial) {
        return Err(SemanticFailure::new(
            StageName::Revalidation,
            codes::PARTIAL_NOT_ALLOWED,
            format!(
                "{} non-artifact effect(s) require a PARTIAL commit, which policy does not allow",
                non_artifacts.len()
            ),
            vec![
                codes::NON_ARTIFACT_EFFECTS_PRESENT,
                codes::PARTIAL_NOT_ALLOWED_BY_POLICY,
            ],
        )
        .with_mode(CommitMode::Partial)
        .with_detail(json!({
            "proposalId": proposal_id,
            "nonArtifactEffects": non_artifacts,
        })));
    }

    let mut seen = HashSet::new();
    let commit_allow_list: Vec<String> = log
        .effects
        .iter()
        .filter(|e| e.trust == TrustLevel::Provisional)
        .filter_map(|e| e.object_id())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect();

    Ok(RevalidationDirective {
        proposal_id,
        outcome: CommitOutcome::PartialCommit,
        commit_allow_list,
        rules_applied: vec![codes::NON_ARTIFACT_EFFECTS_PRESENT.into()],
    })
}
