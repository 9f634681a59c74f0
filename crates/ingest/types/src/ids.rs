use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::stage::StageName;

/// Keys of the identifiers carried in an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdKey {
    ProposalId,
    IntakeId,
    ValidationId,
    PlanId,
    ExecutionId,
    RevalidationId,
    CommitId,
}

impl IdKey {
    /// The id each stage mints when it runs.
    pub fn minted_by(stage: StageName) -> IdKey {
        match stage {
            StageName::Intake => IdKey::IntakeId,
            StageName::Validation => IdKey::ValidationId,
            StageName::Planning => IdKey::PlanId,
            StageName::Execution => IdKey::ExecutionId,
            StageName::Revalidation => IdKey::RevalidationId,
            StageName::Commit => IdKey::CommitId,
        }
    }

    /// Prefix handed to the id provider, e.g. `commit` for `commit_<opaque>`.
    pub fn id_kind(&self) -> &'static str {
        match self {
            IdKey::ProposalId => "proposal",
            IdKey::IntakeId => "intake",
            IdKey::ValidationId => "validation",
            IdKey::PlanId => "plan",
            IdKey::ExecutionId => "exec",
            IdKey::RevalidationId => "reval",
            IdKey::CommitId => "commit",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdKey::ProposalId => "proposalId",
            IdKey::IntakeId => "intakeId",
            IdKey::ValidationId => "validationId",
            IdKey::PlanId => "planId",
            IdKey::ExecutionId => "executionId",
            IdKey::RevalidationId => "revalidationId",
            IdKey::CommitId => "commitId",
        }
    }
}

impl std::fmt::Display for IdKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifiers accumulated as the envelope moves through the stages.
///
/// Ids are populated incrementally and never cleared or replaced once set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineIds(BTreeMap<IdKey, String>);

impl PipelineIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed ids with a proposal id.
    pub fn for_proposal(proposal_id: impl Into<String>) -> Self {
        let mut ids = Self::new();
        ids.merge(IdKey::ProposalId, proposal_id);
        ids
    }

    /// Raw lookup; may return an empty string if one was deserialized.
    pub fn get(&self, key: IdKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    /// Lookup that treats empty or whitespace-only values as missing.
    pub fn present(&self, key: IdKey) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn proposal_id(&self) -> Option<&str> {
        self.present(IdKey::ProposalId)
    }

    /// Set `key` unless a non-empty value is already present.
    ///
    /// Returns `true` if the value was written.
    pub fn merge(&mut self, key: IdKey, value: impl Into<String>) -> bool {
        if self.present(key).is_some() {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    /// Snapshot the given keys as observed ids (missing keys are skipped).
    pub fn observe(&self, keys: &[IdKey]) -> Vec<ObservedId> {
        keys.iter()
            .filter_map(|k| {
                self.present(*k).map(|v| ObservedId {
                    key: *k,
                    value: v.to_string(),
                })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An id a stage relied on when it ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedId {
    pub key: IdKey,
    pub value: String,
}
