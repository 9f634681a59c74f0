//! Static stage dependency table consulted by both the Pre-Guard and the Guard.

use maple_ingest_types::{IdKey, StageName};

/// What a stage needs before it may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageDependencies {
    pub stage: StageName,
    /// Predecessor stages, checked in declaration order.
    pub required_stages: &'static [StageName],
    /// Ids that must be non-empty, checked in declaration order.
    pub required_ids: &'static [IdKey],
}

/// Indexed by `StageName::position()`.
pub const DEPENDENCIES: [StageDependencies; 6] = [
    StageDependencies {
        stage: StageName::Intake,
        required_stages: &[],
        required_ids: &[IdKey::ProposalId],
    },
    StageDependencies {
        stage: StageName::Validation,
        required_stages: &[StageName::Intake],
        required_ids: &[IdKey::ProposalId, IdKey::IntakeId],
    },
    StageDependencies {
        stage: StageName::Planning,
        required_stages: &[StageName::Intake, StageName::Validation],
        required_ids: &[IdKey::ProposalId, IdKey::ValidationId],
    },
    StageDependencies {
        stage: StageName::Execution,
        required_stages: &[StageName::Planning],
        required_ids: &[IdKey::ProposalId, IdKey::PlanId],
    },
    StageDependencies {
        stage: StageName::Revalidation,
        required_stages: &[StageName::Execution],
        required_ids: &[IdKey::ProposalId, IdKey::ExecutionId],
    },
    StageDependencies {
        stage: StageName::Commit,
        required_stages: &[StageName::Revalidation, StageName::Execution],
        required_ids: &[IdKey::ProposalId, IdKey::RevalidationId, IdKey::ExecutionId],
    },
];

pub fn for_stage(stage: StageName) -> &'static StageDependencies {
    &DEPENDENCIES[stage.position()]
}
