use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::effect::Effect;
use crate::error::ShapeError;
use crate::stage::StageName;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    InProgress,
    Applied,
    Failed,
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::InProgress => "IN_PROGRESS",
            OutboxStatus::Applied => "APPLIED",
            OutboxStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why an apply attempt failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
    pub at: DateTime<Utc>,
}

/// Durable intent to apply one approved effect.
///
/// `error` is present iff `status == FAILED`. Entries are never deleted;
/// retries bump `attempts` and `last_error` survives them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxEntry {
    pub outbox_id: String,
    pub idempotency_key: String,
    pub pipeline: String,
    pub stage: StageName,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutboxErrorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<OutboxErrorRecord>,
}

impl OutboxEntry {
    /// A fresh PENDING entry with zero attempts.
    pub fn pending(
        outbox_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        pipeline: impl Into<String>,
        stage: StageName,
        effect: Effect,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            outbox_id: outbox_id.into(),
            idempotency_key: idempotency_key.into(),
            pipeline: pipeline.into(),
            stage,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
            applied_at: None,
            effect,
            error: None,
            last_error: None,
        }
    }

    /// Strict parse of the wire shape: unknown fields are rejected and the
    /// `error`/`status` pairing is enforced.
    pub fn parse(value: Value) -> Result<Self, ShapeError> {
        let entry: OutboxEntry =
            serde_json::from_value(value).map_err(|e| ShapeError::Deserialize(e.to_string()))?;
        entry.check_invariants()?;
        Ok(entry)
    }

    pub fn check_invariants(&self) -> Result<(), ShapeError> {
        if self.outbox_id.trim().is_empty() {
            return Err(ShapeError::MissingField("outbox_id"));
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(ShapeError::MissingField("idempotency_key"));
        }
        match (self.status, self.error.is_some()) {
            (OutboxStatus::Failed, false) => Err(ShapeError::InvalidField {
                field: "error",
                reason: "FAILED entries must carry an error".into(),
            }),
            (status, true) if status != OutboxStatus::Failed => Err(ShapeError::InvalidField {
                field: "error",
                reason: format!("{} entries must not carry an error", status),
            }),
            _ => Ok(()),
        }
    }
}
