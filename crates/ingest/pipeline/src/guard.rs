use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use maple_ingest_types::{CommitMode, Envelope, ErrorRecord, StageName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::{Candidate, ContractViolation};
use crate::dependencies;
use crate::traits::ContractChecker;

/// Trace attached to a guard failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardTrace {
    pub mode: CommitMode,
    pub rules_applied: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ContractViolation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_stages: Vec<StageName>,
}

/// A guard rejection. Returned to the calling stage, never recorded by the guard.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardFailure {
    pub code: String,
    pub stage: StageName,
    pub message: String,
    pub trace: GuardTrace,
}

impl GuardFailure {
    pub fn to_error_record(&self, at: DateTime<Utc>) -> ErrorRecord {
        ErrorRecord::halt(
            self.stage,
            self.code.clone(),
            self.message.clone(),
            serde_json::to_value(&self.trace).ok(),
            at,
        )
    }
}

/// Pure input guard for one stage.
///
/// Narrows the envelope, plucks the stage candidate and validates it through
/// the contract checker. Never appends errors and never writes stage output.
pub struct Guard<C> {
    stage: StageName,
    schema: &'static str,
    code: String,
    parse_failed_rule: String,
    _candidate: PhantomData<fn() -> C>,
}

impl<C: Candidate> Guard<C> {
    /// Guard with the stage's conventional code, schema and parse-failed rule.
    pub fn for_stage() -> Self {
        Self {
            stage: C::STAGE,
            schema: C::SCHEMA,
            code: C::STAGE.invalid_input_code(),
            parse_failed_rule: C::STAGE.parse_failed_rule(),
            _candidate: PhantomData,
        }
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }

    fn fail(&self, message: impl Into<String>, violations: Vec<ContractViolation>) -> GuardFailure {
        GuardFailure {
            code: self.code.clone(),
            stage: self.stage,
            message: message.into(),
            trace: GuardTrace {
                mode: CommitMode::Unknown,
                rules_applied: vec![self.parse_failed_rule.clone()],
                violations,
                missing_stages: Vec::new(),
            },
        }
    }

    /// Validate a typed envelope.
    pub fn check<P>(
        &self,
        envelope: &Envelope,
        checker: &dyn ContractChecker,
        pluck: P,
    ) -> Result<C, GuardFailure>
    where
        P: FnOnce(&Envelope) -> Result<C, Vec<ContractViolation>>,
    {
        if envelope.proposal_id().is_none() {
            return Err(self.fail(
                format!("{} input has no proposal id", self.stage),
                vec![ContractViolation::new("ids.proposalId", "must be a non-empty string")],
            ));
        }

        let missing_stages: Vec<StageName> = dependencies::for_stage(self.stage)
            .required_stages
            .iter()
            .copied()
            .filter(|s| !envelope.has_slot(*s))
            .collect();
        if !missing_stages.is_empty() {
            let mut failure = self.fail(
                format!("{} input is missing dependency stage objects", self.stage),
                Vec::new(),
            );
            failure.trace.missing_stages = missing_stages;
            return Err(failure);
        }

        let candidate = pluck(envelope).map_err(|violations| {
            self.fail(format!("{} input could not be read", self.stage), violations)
        })?;

        let validated = checker
            .validate(self.schema, candidate.into_stage_candidate())
            .map_err(|violations| {
                self.fail(
                    format!("{} input failed contract {}", self.stage, self.schema),
                    violations,
                )
            })?;

        C::from_stage_candidate(validated).ok_or_else(|| {
            self.fail(
                format!("{} contract returned a foreign candidate", self.stage),
                vec![ContractViolation::new("$", "candidate stage mismatch")],
            )
        })
    }

    /// Validate an untyped wire envelope: non-objects and unparseable shapes
    /// are rejected before the typed checks run.
    pub fn check_wire<P>(
        &self,
        value: &Value,
        checker: &dyn ContractChecker,
        pluck: P,
    ) -> Result<C, GuardFailure>
    where
        P: FnOnce(&Envelope) -> Result<C, Vec<ContractViolation>>,
    {
        if !value.is_object() {
            return Err(self.fail(
                format!("{} input is not an object", self.stage),
                vec![ContractViolation::new("$", "expected an object")],
            ));
        }
        for field in ["ids", "stages"] {
            if !value.get(field).is_some_and(Value::is_object) {
                return Err(self.fail(
                    format!("{} input has no {} object", self.stage, field),
                    vec![ContractViolation::new(field, "expected an object")],
                ));
            }
        }
        let envelope = Envelope::from_value(value.clone()).map_err(|e| {
            self.fail(
                format!("{} input is not an envelope", self.stage),
                vec![ContractViolation::new("$", e.to_string())],
            )
        })?;
        self.check(&envelope, checker, pluck)
    }
}
