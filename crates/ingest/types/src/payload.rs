//! Per-stage output payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effect::{Effect, EffectsLog};
use crate::outbox::OutboxEntry;
use crate::proposal::{Operation, Proposal};
use crate::stage::StageName;
use crate::trust::TrustLevel;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntakeOutput {
    pub intake_id: String,
    /// Fingerprint of `{proposalId, raw}`; identical input yields an identical value.
    pub fingerprint: String,
    pub proposal: Proposal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub rule: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub validation_id: String,
    pub actor: String,
    pub invariants_version: String,
    pub checks: Vec<ValidationCheck>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Fingerprint of the proposal id and the operation.
    pub step_id: String,
    pub index: usize,
    pub operation: Operation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub plan_id: String,
    pub steps: Vec<PlanStep>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub execution_id: String,
    pub effects_log: EffectsLog,
}

/// Revalidation's verdict on whether and how to commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitOutcome {
    ApproveCommit,
    PartialCommit,
    RejectCommit,
}

impl CommitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitOutcome::ApproveCommit => "APPROVE_COMMIT",
            CommitOutcome::PartialCommit => "PARTIAL_COMMIT",
            CommitOutcome::RejectCommit => "REJECT_COMMIT",
        }
    }
}

impl std::fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How Commit treats the allow list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitMode {
    Full,
    Partial,
    Unknown,
}

/// Produced once by Revalidation, consumed once by Commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidationDirective {
    pub proposal_id: String,
    pub outcome: CommitOutcome,
    pub commit_allow_list: Vec<String>,
    pub rules_applied: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevalidationOutput {
    pub revalidation_id: String,
    pub directive: RevalidationDirective,
}

/// A trust promotion performed during Commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub stable_id: String,
    pub object_id: String,
    pub from: TrustLevel,
    pub to: TrustLevel,
    pub stage: StageName,
    pub reason: String,
    pub promoted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedEffect {
    pub effect: Effect,
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IgnoredEffect {
    pub effect: Effect,
    pub reason: String,
}

/// Partition of every produced effect.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitEffects {
    pub approved: Vec<Effect>,
    pub rejected: Vec<RejectedEffect>,
    pub ignored: Vec<IgnoredEffect>,
}

impl CommitEffects {
    pub fn total(&self) -> usize {
        self.approved.len() + self.rejected.len() + self.ignored.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    pub mode: CommitMode,
    pub outcome: CommitOutcome,
    pub rules_applied: Vec<String>,
}

/// The Commit stage's payload.
///
/// `promotions` and `outbox` each pair 1:1 with `effects.approved`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_id: String,
    pub proposal_id: String,
    pub promotions: Vec<PromotionRecord>,
    pub effects: CommitEffects,
    pub justification: Justification,
    pub outbox: Vec<OutboxEntry>,
}
