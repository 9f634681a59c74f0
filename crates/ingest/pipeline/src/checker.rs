use std::collections::HashSet;

use maple_ingest_types::{EffectsLog, Operation, Proposal};

use crate::candidate::{ContractViolation, StageCandidate};
use crate::traits::ContractChecker;

/// Default contract checker: structural rules per stage input.
///
/// Returns the candidate unchanged when it satisfies its schema.
#[derive(Clone, Debug, Default)]
pub struct StructuralChecker;

impl ContractChecker for StructuralChecker {
    fn validate(
        &self,
        _schema: &str,
        candidate: StageCandidate,
    ) -> Result<StageCandidate, Vec<ContractViolation>> {
        let mut violations = Vec::new();
        match &candidate {
            StageCandidate::Intake(c) => check_proposal(&c.proposal, &mut violations),
            StageCandidate::Validation(c) => {
                check_proposal(&c.proposal, &mut violations);
                non_empty(
                    &c.snapshot.permissions.actor,
                    "snapshot.permissions.actor",
                    &mut violations,
                );
                non_empty(
                    &c.snapshot.invariants_version,
                    "snapshot.invariants_version",
                    &mut violations,
                );
            }
            StageCandidate::Planning(c) => {
                check_proposal(&c.proposal, &mut violations);
                non_empty(
                    &c.validation.validation_id,
                    "validation.validation_id",
                    &mut violations,
                );
            }
            StageCandidate::Execution(c) => {
                non_empty(&c.plan.plan_id, "plan.plan_id", &mut violations);
                for (i, step) in c.plan.steps.iter().enumerate() {
                    if step.index != i {
                        violations.push(ContractViolation::new(
                            format!("plan.steps[{}].index", i),
                            format!("expected {}, found {}", i, step.index),
                        ));
                    }
                    non_empty(
                        &step.step_id,
                        &format!("plan.steps[{}].step_id", i),
                        &mut violations,
                    );
                }
            }
            StageCandidate::Revalidation(c) => check_effects_log(&c.effects_log, &mut violations),
            StageCandidate::Commit(c) => {
                check_effects_log(&c.effects_log, &mut violations);
                non_empty(
                    &c.revalidation.proposal_id,
                    "revalidation.proposal_id",
                    &mut violations,
                );
                for (i, id) in c.revalidation.commit_allow_list.iter().enumerate() {
                    non_empty(
                        id,
                        &format!("revalidation.commit_allow_list[{}]", i),
                        &mut violations,
                    );
                }
            }
        }

        if violations.is_empty() {
            Ok(candidate)
        } else {
            Err(violations)
        }
    }
}

fn non_empty(value: &str, path: &str, violations: &mut Vec<ContractViolation>) {
    if value.trim().is_empty() {
        violations.push(ContractViolation::new(path, "must not be empty"));
    }
}

fn check_proposal(proposal: &Proposal, violations: &mut Vec<ContractViolation>) {
    non_empty(&proposal.actor, "proposal.actor", violations);
    non_empty(&proposal.title, "proposal.title", violations);
    if proposal.operations.is_empty() {
        violations.push(ContractViolation::new(
            "proposal.operations",
            "at least one operation is required",
        ));
    }

    let mut seen = HashSet::new();
    for (i, op) in proposal.operations.iter().enumerate() {
        match op {
            Operation::CreateArtifact {
                object_id, kind, ..
            } => {
                non_empty(
                    object_id,
                    &format!("proposal.operations[{}].object_id", i),
                    violations,
                );
                non_empty(kind, &format!("proposal.operations[{}].kind", i), violations);
                if !seen.insert(object_id.as_str()) {
                    violations.push(ContractViolation::new(
                        format!("proposal.operations[{}].object_id", i),
                        format!("duplicate object id {}", object_id),
                    ));
                }
            }
            Operation::EmitEvent { event_name, .. } => non_empty(
                event_name,
                &format!("proposal.operations[{}].event_name", i),
                violations,
            ),
            Operation::Other { .. } => {}
        }
    }
}

fn check_effects_log(log: &EffectsLog, violations: &mut Vec<ContractViolation>) {
    non_empty(&log.proposal_id, "effects_log.proposal_id", violations);
    let mut seen = HashSet::new();
    for (i, effect) in log.effects.iter().enumerate() {
        non_empty(
            &effect.stable_id,
            &format!("effects_log.effects[{}].stable_id", i),
            violations,
        );
        if !seen.insert(effect.stable_id.as_str()) {
            violations.push(ContractViolation::new(
                format!("effects_log.effects[{}].stable_id", i),
                "duplicate stable id",
            ));
        }
        if let Some(object_id) = effect.object_id() {
            non_empty(
                object_id,
                &format!("effects_log.effects[{}].object_id", i),
                violations,
            );
        }
    }
}
