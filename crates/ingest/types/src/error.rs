use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::stage::StageName;

/// Error codes and rule names that are not derived from a stage name.
pub mod codes {
    pub const PROPOSAL_NOT_PERMITTED: &str = "PROPOSAL_NOT_PERMITTED";
    pub const COMMIT_INPUT_MISMATCH: &str = "COMMIT_INPUT_MISMATCH";
    pub const COMMIT_OUTCOME_UNSUPPORTED: &str = "COMMIT_OUTCOME_UNSUPPORTED";
    pub const ALLOWLIST_UNKNOWN_OBJECT: &str = "ALLOWLIST_UNKNOWN_OBJECT";
    pub const PARTIAL_NOT_ALLOWED: &str = "PARTIAL_NOT_ALLOWED";
    pub const PLAN_STEP_UNSERIALIZABLE: &str = "PLAN_STEP_UNSERIALIZABLE";

    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const NO_OP: &str = "NO_OP";
    pub const TRUST_DOWNGRADE_FORBIDDEN: &str = "TRUST_DOWNGRADE_FORBIDDEN";
    pub const COMMIT_STAGE_REQUIRED: &str = "COMMIT_STAGE_REQUIRED";

    pub const DRIFT_DETECTED: &str = "DRIFT_DETECTED";
    pub const NON_ARTIFACT_EFFECTS_PRESENT: &str = "NON_ARTIFACT_EFFECTS_PRESENT";
    pub const PARTIAL_NOT_ALLOWED_BY_POLICY: &str = "PARTIAL_NOT_ALLOWED_BY_POLICY";
    pub const ALL_ARTIFACT_EFFECTS: &str = "ALL_ARTIFACT_EFFECTS";
    pub const PROPOSAL_ID_MISMATCH_REVALIDATION: &str = "PROPOSAL_ID_MISMATCH_REVALIDATION";
    pub const PROPOSAL_ID_MISMATCH_EFFECTS_LOG: &str = "PROPOSAL_ID_MISMATCH_EFFECTS_LOG";
    pub const PARTIAL_EMPTY_ALLOWLIST_COMMITS_NOTHING: &str =
        "PARTIAL_EMPTY_ALLOWLIST_COMMITS_NOTHING";
    pub const FULL_IGNORES_ALLOWLIST: &str = "FULL_IGNORES_ALLOWLIST";
    pub const PARTIAL_ALLOWLIST_APPLIED: &str = "PARTIAL_ALLOWLIST_APPLIED";

    pub const NOT_PROVISIONAL: &str = "NOT_PROVISIONAL";
    pub const NOT_ALLOWLIST_OBJECT: &str = "NOT_ALLOWLIST_OBJECT";
    pub const NON_ARTIFACT_EFFECT: &str = "NON_ARTIFACT_EFFECT";
    pub const PARTIAL_EMPTY_ALLOWLIST: &str = "PARTIAL_EMPTY_ALLOWLIST";
}

/// HALT stops the pipeline for this envelope permanently; WARN is informational.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Halt,
    Warn,
}

/// One entry in the envelope's append-only error list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: StageName,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn halt(
        stage: StageName,
        code: impl Into<String>,
        message: impl Into<String>,
        trace: Option<Value>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            severity: Severity::Halt,
            code: code.into(),
            message: message.into(),
            trace,
            at,
        }
    }

    pub fn is_halt(&self) -> bool {
        self.severity == Severity::Halt
    }
}

/// Structural problems with a hand-built or deserialized value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("deserialization failed: {0}")]
    Deserialize(String),
}
