//! Typed per-stage inputs and the accessors that pluck them from an envelope.
//!
//! A candidate is only ever built through these accessors; anything the
//! accessor cannot find or parse is reported as a contract violation.

use maple_ingest_types::{
    EffectsLog, Envelope, PlanOutput, Proposal, RevalidationDirective, Snapshot, StageName,
    ValidationOutput,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CommitPolicy;

/// One structural problem found while plucking or validating a candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractViolation {
    pub path: String,
    pub message: String,
}

impl ContractViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    fn missing(path: &str) -> Self {
        Self::new(path, "required value is missing")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntakeCandidate {
    pub proposal_id: String,
    pub raw: Value,
    pub proposal: Proposal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationCandidate {
    pub proposal_id: String,
    pub proposal: Proposal,
    pub snapshot: Snapshot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanningCandidate {
    pub proposal_id: String,
    pub proposal: Proposal,
    pub validation: ValidationOutput,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionCandidate {
    pub proposal_id: String,
    pub plan: PlanOutput,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RevalidationCandidate {
    pub proposal_id: String,
    pub effects_log: EffectsLog,
    pub commit_policy: CommitPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommitCandidate {
    pub proposal_id: String,
    pub revalidation: RevalidationDirective,
    pub effects_log: EffectsLog,
}

/// Sum of every stage's input, as seen by the contract checker.
#[derive(Clone, Debug, PartialEq)]
pub enum StageCandidate {
    Intake(IntakeCandidate),
    Validation(ValidationCandidate),
    Planning(PlanningCandidate),
    Execution(ExecutionCandidate),
    Revalidation(RevalidationCandidate),
    Commit(CommitCandidate),
}

impl StageCandidate {
    pub fn stage(&self) -> StageName {
        match self {
            StageCandidate::Intake(_) => StageName::Intake,
            StageCandidate::Validation(_) => StageName::Validation,
            StageCandidate::Planning(_) => StageName::Planning,
            StageCandidate::Execution(_) => StageName::Execution,
            StageCandidate::Revalidation(_) => StageName::Revalidation,
            StageCandidate::Commit(_) => StageName::Commit,
        }
    }
}

/// Ties a concrete candidate type to its stage and schema.
pub trait Candidate: Sized {
    const STAGE: StageName;
    const SCHEMA: &'static str;

    fn into_stage_candidate(self) -> StageCandidate;
    fn from_stage_candidate(candidate: StageCandidate) -> Option<Self>;
}

macro_rules! impl_candidate {
    ($ty:ident, $variant:ident, $schema:literal) => {
        impl Candidate for $ty {
            const STAGE: StageName = StageName::$variant;
            const SCHEMA: &'static str = $schema;

            fn into_stage_candidate(self) -> StageCandidate {
                StageCandidate::$variant(self)
            }

            fn from_stage_candidate(candidate: StageCandidate) -> Option<Self> {
                match candidate {
                    StageCandidate::$variant(c) => Some(c),
                    _ => None,
                }
            }
        }
    };
}

impl_candidate!(IntakeCandidate, Intake, "ingest.intake.v1");
impl_candidate!(ValidationCandidate, Validation, "ingest.validation.v1");
impl_candidate!(PlanningCandidate, Planning, "ingest.planning.v1");
impl_candidate!(ExecutionCandidate, Execution, "ingest.execution.v1");
impl_candidate!(RevalidationCandidate, Revalidation, "ingest.revalidation.v1");
impl_candidate!(CommitCandidate, Commit, "ingest.commit.v1");

type Plucked<T> = Result<T, Vec<ContractViolation>>;

fn proposal_id(envelope: &Envelope) -> Plucked<String> {
    envelope
        .proposal_id()
        .map(str::to_string)
        .ok_or_else(|| vec![ContractViolation::missing("ids.proposalId")])
}

fn intake_proposal(envelope: &Envelope) -> Plucked<Proposal> {
    envelope
        .intake()
        .map(|i| i.proposal.clone())
        .ok_or_else(|| vec![ContractViolation::missing("stages.INTAKE.payload")])
}

pub fn pluck_intake(envelope: &Envelope) -> Plucked<IntakeCandidate> {
    let proposal_id = proposal_id(envelope)?;
    let raw = envelope
        .meta()
        .and_then(|m| m.raw_proposal.clone())
        .ok_or_else(|| vec![ContractViolation::missing("meta.raw_proposal")])?;
    if !raw.is_object() {
        return Err(vec![ContractViolation::new(
            "meta.raw_proposal",
            "proposal must be an object",
        )]);
    }
    let proposal: Proposal = serde_json::from_value(raw.clone())
        .map_err(|e| vec![ContractViolation::new("meta.raw_proposal", e.to_string())])?;
    Ok(IntakeCandidate {
        proposal_id,
        raw,
        proposal,
    })
}

pub fn pluck_validation(envelope: &Envelope) -> Plucked<ValidationCandidate> {
    let proposal_id = proposal_id(envelope)?;
    let proposal = intake_proposal(envelope)?;
    let snapshot = envelope
        .snapshot()
        .cloned()
        .ok_or_else(|| vec![ContractViolation::missing("snapshot")])?;
    Ok(ValidationCandidate {
        proposal_id,
        proposal,
        snapshot,
    })
}

pub fn pluck_planning(envelope: &Envelope) -> Plucked<PlanningCandidate> {
    let proposal_id = proposal_id(envelope)?;
    let proposal = intake_proposal(envelope)?;
    let validation = envelope
        .validation()
        .cloned()
        .ok_or_else(|| vec![ContractViolation::missing("stages.VALIDATION.payload")])?;
    Ok(PlanningCandidate {
        proposal_id,
        proposal,
        validation,
    })
}

pub fn pluck_execution(envelope: &Envelope) -> Plucked<ExecutionCandidate> {
    let proposal_id = proposal_id(envelope)?;
    let plan = envelope
        .plan()
        .cloned()
        .ok_or_else(|| vec![ContractViolation::missing("stages.PLANNING.payload")])?;
    Ok(ExecutionCandidate { proposal_id, plan })
}

fn effects_log(envelope: &Envelope) -> Plucked<EffectsLog> {
    envelope
        .execution()
        .map(|e| e.effects_log.clone())
        .ok_or_else(|| vec![ContractViolation::missing("stages.EXECUTION.payload.effects_log")])
}

pub fn pluck_revalidation(
    envelope: &Envelope,
    commit_policy: &CommitPolicy,
) -> Plucked<RevalidationCandidate> {
    Ok(RevalidationCandidate {
        proposal_id: proposal_id(envelope)?,
        effects_log: effects_log(envelope)?,
        commit_policy: commit_policy.clone(),
    })
}

pub fn pluck_commit(envelope: &Envelope) -> Plucked<CommitCandidate> {
    let proposal_id = proposal_id(envelope)?;
    let revalidation = envelope
        .revalidation()
        .map(|r| r.directive.clone())
        .ok_or_else(|| {
            vec![ContractViolation::missing(
                "stages.REVALIDATION.payload.directive",
            )]
        })?;
    Ok(CommitCandidate {
        proposal_id,
        revalidation,
        effects_log: effects_log(envelope)?,
    })
}
