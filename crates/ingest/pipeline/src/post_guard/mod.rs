//! Post-Guards: semantic business rules over guard-validated input.
//!
//! Like the Guard, a post-guard never appends to the envelope. It returns a
//! decision or a [`SemanticFailure`] and the calling stage records it.

pub mod commit;
pub mod revalidation;

use chrono::{DateTime, Utc};
use maple_ingest_types::{CommitMode, ErrorRecord, StageName};
use serde_json::{json, Value};

pub use commit::{decide_commit, CommitDecision};
pub use revalidation::decide_revalidation;

/// A structurally valid input that breaks a business rule.
#[derive(Clone, Debug, PartialEq)]
pub struct SemanticFailure {
    pub stage: StageName,
    pub code: &'static str,
    pub message: String,
    pub mode: CommitMode,
    pub rules_applied: Vec<String>,
    pub detail: Option<Value>,
}

impl SemanticFailure {
    pub(crate) fn new(
        stage: StageName,
        code: &'static str,
        message: impl Into<String>,
        rules_applied: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            stage,
            code,
            message: message.into(),
            mode: CommitMode::Unknown,
            rules_applied: rules_applied.into_iter().map(Into::into).collect(),
            detail: None,
        }
    }

    pub(crate) fn with_mode(mut self, mode: CommitMode) -> Self {
        self.mode = mode;
        self
    }

    pub(crate) fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn to_error_record(&self, at: DateTime<Utc>) -> ErrorRecord {
        let mut trace = json!({
            "mode": self.mode,
            "rulesApplied": self.rules_applied,
        });
        if let (Some(detail), Some(obj)) = (&self.detail, trace.as_object_mut()) {
            obj.insert("detail".into(), detail.clone());
        }
        ErrorRecord::halt(self.stage, self.code, self.message.clone(), Some(trace), at)
    }
}
