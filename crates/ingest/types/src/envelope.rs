use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ErrorRecord, ShapeError};
use crate::ids::{IdKey, ObservedId, PipelineIds};
use crate::payload::{
    CommitRecord, ExecutionOutput, IntakeOutput, PlanOutput, RevalidationOutput, ValidationOutput,
};
use crate::snapshot::Snapshot;
use crate::stage::StageName;

/// Output of exactly one stage. The variant decides which slot it lands in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagePayload {
    Intake(IntakeOutput),
    Validation(ValidationOutput),
    Planning(PlanOutput),
    Execution(ExecutionOutput),
    Revalidation(RevalidationOutput),
    Commit(CommitRecord),
}

impl StagePayload {
    pub fn stage(&self) -> StageName {
        match self {
            StagePayload::Intake(_) => StageName::Intake,
            StagePayload::Validation(_) => StageName::Validation,
            StagePayload::Planning(_) => StageName::Planning,
            StagePayload::Execution(_) => StageName::Execution,
            StagePayload::Revalidation(_) => StageName::Revalidation,
            StagePayload::Commit(_) => StageName::Commit,
        }
    }

    /// The stage-scoped id this payload was written under.
    pub fn minted_id(&self) -> &str {
        match self {
            StagePayload::Intake(p) => &p.intake_id,
            StagePayload::Validation(p) => &p.validation_id,
            StagePayload::Planning(p) => &p.plan_id,
            StagePayload::Execution(p) => &p.execution_id,
            StagePayload::Revalidation(p) => &p.revalidation_id,
            StagePayload::Commit(p) => &p.commit_id,
        }
    }
}

/// A completed stage run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageRun {
    pub ran_at: DateTime<Utc>,
    /// Ids this stage relied on.
    pub observed: Vec<ObservedId>,
    pub payload: StagePayload,
}

/// Slot state for one stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageResult {
    NotRun,
    Ran(StageRun),
}

impl StageResult {
    pub fn has_run(&self) -> bool {
        matches!(self, StageResult::Ran(_))
    }

    pub fn run(&self) -> Option<&StageRun> {
        match self {
            StageResult::Ran(run) => Some(run),
            StageResult::NotRun => None,
        }
    }
}

/// Free-form envelope metadata; the raw proposal travels here until Intake parses it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_proposal: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

/// Rejected attempts to write into an envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    #[error("stage {0} already ran; its output is history")]
    AlreadyRan(StageName),

    #[error("envelope carries a HALT error; no further stage output may be recorded")]
    Halted,
}

/// The pipeline state threaded through every stage.
///
/// Errors are append-only. A stage slot moves from `NotRun` to `Ran` once
/// and is never overwritten. After the first HALT, no stage output is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    ids: PipelineIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snapshot: Option<Snapshot>,
    stages: BTreeMap<StageName, StageResult>,
    #[serde(default)]
    errors: Vec<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<EnvelopeMeta>,
}

impl Envelope {
    /// Envelope with every stage slot present and not run.
    pub fn new(ids: PipelineIds) -> Self {
        Self {
            ids,
            snapshot: None,
            stages: StageName::ALL
                .iter()
                .map(|s| (*s, StageResult::NotRun))
                .collect(),
            errors: Vec::new(),
            meta: None,
        }
    }

    /// Seed an envelope for a raw, untrusted proposal.
    pub fn for_proposal(proposal_id: impl Into<String>, raw_proposal: Value) -> Self {
        Self::new(PipelineIds::for_proposal(proposal_id)).with_meta(EnvelopeMeta {
            raw_proposal: Some(raw_proposal),
            ..EnvelopeMeta::default()
        })
    }

    /// Parse an envelope from its wire form.
    pub fn from_value(value: Value) -> Result<Self, ShapeError> {
        if !value.is_object() {
            return Err(ShapeError::InvalidField {
                field: "envelope",
                reason: "expected an object".into(),
            });
        }
        serde_json::from_value(value).map_err(|e| ShapeError::Deserialize(e.to_string()))
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_meta(mut self, meta: EnvelopeMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn ids(&self) -> &PipelineIds {
        &self.ids
    }

    pub fn proposal_id(&self) -> Option<&str> {
        self.ids.proposal_id()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn meta(&self) -> Option<&EnvelopeMeta> {
        self.meta.as_ref()
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Slot for `stage`; `None` only for envelopes deserialized without it.
    pub fn stage(&self, stage: StageName) -> Option<&StageResult> {
        self.stages.get(&stage)
    }

    pub fn has_slot(&self, stage: StageName) -> bool {
        self.stages.contains_key(&stage)
    }

    pub fn has_run(&self, stage: StageName) -> bool {
        self.stage(stage).is_some_and(StageResult::has_run)
    }

    pub fn stage_run(&self, stage: StageName) -> Option<&StageRun> {
        self.stage(stage).and_then(StageResult::run)
    }

    pub fn is_halted(&self) -> bool {
        self.errors.iter().any(ErrorRecord::is_halt)
    }

    pub fn first_halt(&self) -> Option<&ErrorRecord> {
        self.errors.iter().find(|e| e.is_halt())
    }

    /// Append an error. Errors are never removed.
    pub fn push_error(&mut self, error: ErrorRecord) {
        self.errors.push(error);
    }

    /// Write a stage run into the slot named by its payload and merge the
    /// minted id into `ids`.
    pub fn record_stage(&mut self, run: StageRun) -> Result<(), EnvelopeError> {
        if self.is_halted() {
            return Err(EnvelopeError::Halted);
        }
        let stage = run.payload.stage();
        if self.has_run(stage) {
            return Err(EnvelopeError::AlreadyRan(stage));
        }
        let minted = run.payload.minted_id().to_string();
        self.stages.insert(stage, StageResult::Ran(run));
        self.ids.merge(IdKey::minted_by(stage), minted);
        Ok(())
    }

    pub fn intake(&self) -> Option<&IntakeOutput> {
        match self.stage_run(StageName::Intake).map(|r| &r.payload) {
            Some(StagePayload::Intake(p)) => Some(p),
            _ => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationOutput> {
        match self.stage_run(StageName::Validation).map(|r| &r.payload) {
            Some(StagePayload::Validation(p)) => Some(p),
            _ => None,
        }
    }

    pub fn plan(&self) -> Option<&PlanOutput> {
        match self.stage_run(StageName::Planning).map(|r| &r.payload) {
            Some(StagePayload::Planning(p)) => Some(p),
            _ => None,
        }
    }

    pub fn execution(&self) -> Option<&ExecutionOutput> {
        match self.stage_run(StageName::Execution).map(|r| &r.payload) {
            Some(StagePayload::Execution(p)) => Some(p),
            _ => None,
        }
    }

    pub fn revalidation(&self) -> Option<&RevalidationOutput> {
        match self.stage_run(StageName::Revalidation).map(|r| &r.payload) {
            Some(StagePayload::Revalidation(p)) => Some(p),
            _ => None,
        }
    }

    pub fn commit(&self) -> Option<&CommitRecord> {
        match self.stage_run(StageName::Commit).map(|r| &r.payload) {
            Some(StagePayload::Commit(p)) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectsLog;
    use crate::error::codes;
    use serde_json::json;

    fn execution_run(id: &str) -> StageRun {
        StageRun {
            ran_at: Utc::now(),
            observed: vec![],
            payload: StagePayload::Execution(ExecutionOutput {
                execution_id: id.into(),
                effects_log: EffectsLog::new("prop_1", vec![]),
            }),
        }
    }

    #[test]
    fn new_envelope_has_every_slot_not_run() {
        let env = Envelope::for_proposal("prop_1", json!({}));
        for stage in StageName::ALL {
            assert!(env.has_slot(stage));
            assert!(!env.has_run(stage));
        }
        assert_eq!(env.proposal_id(), Some("prop_1"));
        assert!(!env.is_halted());
    }

    #[test]
    fn record_stage_writes_own_slot_and_merges_id() {
        let mut env = Envelope::for_proposal("prop_1", json!({}));
        env.record_stage(execution_run("exec_1")).unwrap();

        assert!(env.has_run(StageName::Execution));
        assert!(!env.has_run(StageName::Commit));
        assert_eq!(env.ids().get(IdKey::ExecutionId), Some("exec_1"));
        assert!(env.execution().is_some());
    }

    #[test]
    fn stage_output_is_write_once() {
        let mut env = Envelope::for_proposal("prop_1", json!({}));
        env.record_stage(execution_run("exec_1")).unwrap();
        let err = env.record_stage(execution_run("exec_2")).unwrap_err();

        assert_eq!(err, EnvelopeError::AlreadyRan(StageName::Execution));
        assert_eq!(env.execution().unwrap().execution_id, "exec_1");
        assert_eq!(env.ids().get(IdKey::ExecutionId), Some("exec_1"));
    }

    #[test]
    fn halted_envelope_refuses_writes() {
        let mut env = Envelope::for_proposal("prop_1", json!({}));
        env.push_error(ErrorRecord::halt(
            StageName::Intake,
            codes::PROPOSAL_NOT_PERMITTED,
            "no",
            None,
            Utc::now(),
        ));
        assert_eq!(
            env.record_stage(execution_run("exec_1")),
            Err(EnvelopeError::Halted)
        );
        assert!(!env.has_run(StageName::Execution));
    }

    #[test]
    fn wire_round_trip_and_missing_slots() {
        let env = Envelope::for_proposal("prop_1", json!({"title": "x"}));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(Envelope::from_value(v).unwrap(), env);

        let sparse = Envelope::from_value(json!({
            "ids": {"proposalId": "prop_1"},
            "stages": {"INTAKE": {"status": "not_run"}}
        }))
        .unwrap();
        assert!(sparse.has_slot(StageName::Intake));
        assert!(!sparse.has_slot(StageName::Validation));

        assert!(Envelope::from_value(json!([1, 2])).is_err());
    }
}
