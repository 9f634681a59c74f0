use std::collections::HashSet;

use chrono::{DateTime, Utc};
use maple_ingest_types::{
    codes, CommitEffects, CommitMode, CommitOutcome, Effect, IgnoredEffect, PromotionRecord,
    RejectedEffect, StageName, TrustLevel,
};
use serde_json::json;
use tracing::{debug, warn};

use super::SemanticFailure;
use crate::candidate::CommitCandidate;
use crate::traits::PromotionPolicy;
use crate::trust::PromotionRequest;

/// What Commit decided, before ids and outbox entries are minted.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitDecision {
    pub mode: CommitMode,
    pub outcome: CommitOutcome,
    pub rules_applied: Vec<String>,
    pub effects: CommitEffects,
    /// 1:1 with `effects.approved`.
    pub promotions: Vec<PromotionRecord>,
}

fn failure(
    code: &'static str,
    message: String,
    rules: impl IntoIterator<Item = impl Into<String>>,
) -> SemanticFailure {
    SemanticFailure::new(StageName::Commit, code, message, rules)
}

/// Partition every produced effect and promote the eligible ones.
///
/// Every produced effect lands in exactly one of approved, rejected or
/// ignored. A promotion `policy` rejection degrades that effect to rejected;
/// the commit itself still succeeds.
pub fn decide_commit(
    candidate: &CommitCandidate,
    policy: &dyn PromotionPolicy,
    at: DateTime<Utc>,
) -> Result<CommitDecision, SemanticFailure> {
    let directive = &candidate.revalidation;
    let log = &candidate.effects_log;

    if directive.proposal_id != candidate.proposal_id {
        return Err(failure(
            codes::COMMIT_INPUT_MISMATCH,
            format!(
                "revalidation is for {}, not {}",
                directive.proposal_id, candidate.proposal_id
            ),
            vec![codes::PROPOSAL_ID_MISMATCH_REVALIDATION],
        ));
    }
    if log.proposal_id != candidate.proposal_id {
        return Err(failure(
            codes::COMMIT_INPUT_MISMATCH,
            format!(
                "effects log is for {}, not {}",
                log.proposal_id, candidate.proposal_id
            ),
            vec![codes::PROPOSAL_ID_MISMATCH_EFFECTS_LOG],
        ));
    }

    let mode = match directive.outcome {
        CommitOutcome::ApproveCommit => CommitMode::Full,
        CommitOutcome::PartialCommit => CommitMode::Partial,
        CommitOutcome::RejectCommit => {
            return Err(failure(
                codes::COMMIT_OUTCOME_UNSUPPORTED,
                format!("cannot commit a {} directive", directive.outcome),
                directive.rules_applied.iter().cloned(),
            ));
        }
    };

    if mode == CommitMode::Partial && directive.commit_allow_list.is_empty() {
        debug!(proposal_id = %candidate.proposal_id, "Empty PARTIAL allow list commits nothing");
        return Ok(CommitDecision {
            mode,
            outcome: directive.outcome,
            rules_applied: vec![codes::PARTIAL_EMPTY_ALLOWLIST_COMMITS_NOTHING.into()],
            effects: CommitEffects {
                ignored: log
                    .effects
                    .iter()
                    .map(|e| IgnoredEffect {
                        effect: e.clone(),
                        reason: codes::PARTIAL_EMPTY_ALLOWLIST.into(),
                    })
                    .collect(),
                ..CommitEffects::default()
            },
            promotions: Vec::new(),
        });
    }

    let allow: HashSet<&str> = directive.commit_allow_list.iter().map(String::as_str).collect();
    let rule = if mode == CommitMode::Partial {
        let known: HashSet<&str> = log.artifact_ids().collect();
        let unknown: Vec<&str> = directive
            .commit_allow_list
            .iter()
            .map(String::as_str)
            .filter(|id| !known.contains(id))
            .collect();
        if !unknown.is_empty() {
            return Err(failure(
                codes::ALLOWLIST_UNKNOWN_OBJECT,
                format!("allow list names unknown objects: {}", unknown.join(", ")),
                vec![codes::PARTIAL_ALLOWLIST_APPLIED],
            )
            .with_mode(mode)
            .with_detail(json!({ "unknownObjectIds": unknown })));
        }
        codes::PARTIAL_ALLOWLIST_APPLIED
    } else {
        codes::FULL_IGNORES_ALLOWLIST
    };

    let mut effects = CommitEffects::default();
    let mut eligible: Vec<&Effect> = Vec::new();
    for effect in &log.effects {
        if effect.trust != TrustLevel::Provisional {
            effects.rejected.push(RejectedEffect {
                effect: effect.clone(),
                code: codes::NOT_PROVISIONAL.into(),
                message: format!("effect trust is {}, not PROVISIONAL", effect.trust),
            });
            continue;
        }
        match effect.object_id() {
            None => effects.ignored.push(IgnoredEffect {
                effect: effect.clone(),
                reason: codes::NON_ARTIFACT_EFFECT.into(),
            }),
            Some(id) if mode == CommitMode::Partial && !allow.contains(id) => {
                effects.rejected.push(RejectedEffect {
                    effect: effect.clone(),
                    code: codes::NOT_ALLOWLIST_OBJECT.into(),
                    message: format!("{} is not on the allow list", id),
                })
            }
            Some(_) => eligible.push(effect),
        }
    }

    let mut promotions = Vec::with_capacity(eligible.len());
    for effect in eligible {
        let request = PromotionRequest::new(
            effect.trust,
            TrustLevel::Committed,
            StageName::Commit,
            format!("{} commit", mode_label(mode)),
        );
        match policy.check(effect, &request) {
            Ok(()) => {
                promotions.push(PromotionRecord {
                    stable_id: effect.stable_id.clone(),
                    object_id: effect.object_id().unwrap_or_default().to_string(),
                    from: request.from,
                    to: request.to,
                    stage: request.stage,
                    reason: request.reason,
                    promoted_at: at,
                });
                effects.approved.push(effect.with_trust(TrustLevel::Committed));
            }
            Err(rejection) => {
                warn!(
                    stable_id = %effect.stable_id,
                    code = rejection.code,
                    "Promotion rejected; effect not committed"
                );
                effects.rejected.push(RejectedEffect {
                    effect: effect.clone(),
                    code: rejection.code.into(),
                    message: rejection.message,
                });
            }
        }
    }

    Ok(CommitDecision {
        mode,
        outcome: directive.outcome,
        rules_applied: vec![rule.into()],
        effects,
        promotions,
    })
}

fn mode_label(mode: CommitMode) -> &'static str {
    match mode {
        CommitMode::Full => "FULL",
        CommitMode::Partial => "PARTIAL",
        CommitMode::Unknown => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::DenyingPolicy;
    use crate::trust::LatticePolicy;
    use maple_ingest_types::{EffectsLog, RevalidationDirective};

    fn candidate(outcome: CommitOutcome, allow: &[&str], effects: Vec<Effect>) -> CommitCandidate {
        CommitCandidate {
            proposal_id: "prop_1".into(),
            revalidation: RevalidationDirective {
                proposal_id: "prop_1".into(),
                outcome,
                commit_allow_list: allow.iter().map(|s| s.to_string()).collect(),
                rules_applied: vec![],
            },
            effects_log: EffectsLog::new("prop_1", effects),
        }
    }

    fn artifact(id: &str, trust: TrustLevel) -> Effect {
        Effect::artifact("prop_1", id, "note", trust)
    }

    #[test]
    fn full_commit_promotes_provisional_artifacts_and_ignores_allow_list() {
        let c = candidate(
            CommitOutcome::ApproveCommit,
            &["x"],
            vec![
                artifact("a", TrustLevel::Provisional),
                artifact("b", TrustLevel::Committed),
                artifact("c", TrustLevel::Provisional),
            ],
        );
        let d = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap();

        assert_eq!(d.mode, CommitMode::Full);
        assert_eq!(d.rules_applied, vec![codes::FULL_IGNORES_ALLOWLIST]);
        assert_eq!(d.effects.approved.len(), 2);
        assert!(d.effects.approved.iter().all(|e| e.trust == TrustLevel::Committed));
        assert_eq!(d.promotions.len(), 2);
        assert_eq!(d.effects.rejected[0].code, codes::NOT_PROVISIONAL);
        assert_eq!(d.effects.total(), 3);
    }

    #[test]
    fn partial_commit_rejects_unlisted_and_ignores_events() {
        let c = candidate(
            CommitOutcome::PartialCommit,
            &["a"],
            vec![
                artifact("a", TrustLevel::Provisional),
                artifact("b", TrustLevel::Provisional),
                Effect::event("prop_1", "notified", None, TrustLevel::Provisional),
            ],
        );
        let d = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap();

        assert_eq!(d.effects.approved.len(), 1);
        assert_eq!(d.effects.approved[0].object_id(), Some("a"));
        assert_eq!(d.effects.rejected[0].code, codes::NOT_ALLOWLIST_OBJECT);
        assert_eq!(d.effects.ignored[0].reason, codes::NON_ARTIFACT_EFFECT);
        assert_eq!(d.effects.total(), 3);
    }

    #[test]
    fn unknown_allow_list_entry_fails_closed() {
        let c = candidate(
            CommitOutcome::PartialCommit,
            &["note_1", "ghost_id"],
            vec![artifact("note_1", TrustLevel::Provisional)],
        );
        let f = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap_err();
        assert_eq!(f.code, codes::ALLOWLIST_UNKNOWN_OBJECT);
        assert_eq!(f.detail.unwrap()["unknownObjectIds"][0], "ghost_id");
    }

    #[test]
    fn empty_partial_allow_list_commits_nothing() {
        let c = candidate(
            CommitOutcome::PartialCommit,
            &[],
            vec![artifact("a", TrustLevel::Provisional)],
        );
        let d = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap();
        assert!(d.effects.approved.is_empty());
        assert!(d.promotions.is_empty());
        assert_eq!(d.effects.ignored.len(), 1);
        assert_eq!(d.rules_applied, vec![codes::PARTIAL_EMPTY_ALLOWLIST_COMMITS_NOTHING]);
    }

    #[test]
    fn mismatches_and_reject_outcome_fail() {
        let mut c = candidate(CommitOutcome::ApproveCommit, &[], vec![]);
        c.revalidation.proposal_id = "prop_2".into();
        let f = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap_err();
        assert_eq!(f.code, codes::COMMIT_INPUT_MISMATCH);
        assert_eq!(f.rules_applied, vec![codes::PROPOSAL_ID_MISMATCH_REVALIDATION]);

        let mut c = candidate(CommitOutcome::ApproveCommit, &[], vec![]);
        c.effects_log.proposal_id = "prop_2".into();
        let f = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap_err();
        assert_eq!(f.rules_applied, vec![codes::PROPOSAL_ID_MISMATCH_EFFECTS_LOG]);

        let mut c = candidate(CommitOutcome::RejectCommit, &[], vec![]);
        c.revalidation.rules_applied = vec![codes::DRIFT_DETECTED.into()];
        let f = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap_err();
        assert_eq!(f.code, codes::COMMIT_OUTCOME_UNSUPPORTED);
        assert_eq!(f.rules_applied, vec![codes::DRIFT_DETECTED]);
    }

    #[test]
    fn reject_outcome_keeps_every_directive_rule() {
        let mut c = candidate(CommitOutcome::RejectCommit, &[], vec![]);
        c.revalidation.rules_applied = vec![
            codes::DRIFT_DETECTED.into(),
            "TENANT_QUOTA_EXCEEDED".into(),
        ];
        let f = decide_commit(&c, &LatticePolicy, Utc::now()).unwrap_err();
        assert_eq!(f.rules_applied, vec![codes::DRIFT_DETECTED, "TENANT_QUOTA_EXCEEDED"]);

        let trace = f.to_error_record(Utc::now()).trace.unwrap();
        assert_eq!(
            trace["rulesApplied"],
            json!([codes::DRIFT_DETECTED, "TENANT_QUOTA_EXCEEDED"])
        );
    }

    #[test]
    fn denied_promotion_rejects_only_that_effect() {
        let c = candidate(
            CommitOutcome::ApproveCommit,
            &[],
            vec![
                artifact("a", TrustLevel::Provisional),
                artifact("b", TrustLevel::Provisional),
                artifact("c", TrustLevel::Provisional),
            ],
        );
        let d = decide_commit(&c, &DenyingPolicy::for_objects(&["b"]), Utc::now()).unwrap();

        let approved: Vec<&str> = d.effects.approved.iter().filter_map(Effect::object_id).collect();
        assert_eq!(approved, vec!["a", "c"]);
        assert_eq!(d.promotions.len(), 2);
        assert_eq!(d.effects.rejected.len(), 1);
        let rejected = &d.effects.rejected[0];
        assert_eq!(rejected.effect.object_id(), Some("b"));
        assert_eq!(rejected.effect.trust, TrustLevel::Provisional);
        assert_eq!(rejected.code, DenyingPolicy::CODE);
        assert_eq!(rejected.message, "promotion of b denied");
        assert_eq!(d.effects.total(), 3);
    }
}
