use chrono::{DateTime, Utc};
use maple_ingest_types::{Envelope, ErrorRecord, IdKey, StageName};
use serde_json::json;
use tracing::warn;

use crate::dependencies;

/// First unmet prerequisite found by a Pre-Guard.
#[derive(Clone, Debug, PartialEq)]
pub enum PrereqMissing {
    /// A predecessor stage has not run (or its slot is absent).
    Stage { required: StageName },
    /// A required id is missing or blank.
    Id { key: IdKey, value: Option<String> },
}

/// Stage-scoped dependency check.
///
/// Predecessor stages are checked first, then ids, each in declaration
/// order; the first miss short-circuits. Never touches stage payloads.
#[derive(Clone, Debug)]
pub struct PreGuard {
    stage: StageName,
    code: String,
}

impl PreGuard {
    pub fn new(stage: StageName) -> Self {
        Self {
            stage,
            code: stage.prereq_missing_code(),
        }
    }

    pub fn stage(&self) -> StageName {
        self.stage
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Pure check; reports the first unmet prerequisite.
    pub fn check(&self, envelope: &Envelope) -> Result<(), PrereqMissing> {
        let deps = dependencies::for_stage(self.stage);

        if let Some(required) = deps
            .required_stages
            .iter()
            .find(|s| !envelope.has_run(**s))
        {
            return Err(PrereqMissing::Stage {
                required: *required,
            });
        }

        if let Some(key) = deps
            .required_ids
            .iter()
            .find(|k| envelope.ids().present(**k).is_none())
        {
            return Err(PrereqMissing::Id {
                key: *key,
                value: envelope.ids().get(*key).map(str::to_string),
            });
        }

        Ok(())
    }

    /// HALT record describing `missing`.
    pub fn error_record(
        &self,
        envelope: &Envelope,
        missing: &PrereqMissing,
        at: DateTime<Utc>,
    ) -> ErrorRecord {
        let proposal_id = envelope.ids().get(IdKey::ProposalId);
        let (message, trace) = match missing {
            PrereqMissing::Stage { required } => (
                format!("{} requires stage {} to have run", self.stage, required),
                json!({
                    "proposalId": proposal_id,
                    "stage": required,
                    "hasRun": envelope.has_run(*required),
                }),
            ),
            PrereqMissing::Id { key, value } => (
                format!("{} requires id {}", self.stage, key),
                json!({
                    "proposalId": proposal_id,
                    "idKey": key,
                    "value": value,
                }),
            ),
        };
        ErrorRecord::halt(self.stage, self.code.clone(), message, Some(trace), at)
    }

    /// Check and, on failure, return the envelope with a HALT appended.
    pub fn apply(&self, envelope: Envelope, at: DateTime<Utc>) -> Result<Envelope, Envelope> {
        match self.check(&envelope) {
            Ok(()) => Ok(envelope),
            Err(missing) => {
                let record = self.error_record(&envelope, &missing, at);
                warn!(stage = %self.stage, code = %record.code, "Prerequisite missing");
                let mut envelope = envelope;
                envelope.push_error(record);
                Err(envelope)
            }
        }
    }
}
