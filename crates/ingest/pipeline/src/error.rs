use maple_ingest_types::{OutboxStatus, ShapeError};
use serde_json::Value;
use thiserror::Error;

/// Infrastructure errors. Pipeline decisions are data on the envelope, not these.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("pipeline misconfigured: {0}")]
    PipelineMisconfigured(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the outbox ledger and the applier loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutboxError {
    #[error("outbox entry not found: {0}")]
    NotFound(String),

    #[error("duplicate outbox id: {0}")]
    DuplicateEntry(String),

    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("invalid outbox transition for {outbox_id}: {from} -> {to}")]
    InvalidTransition {
        outbox_id: String,
        from: OutboxStatus,
        to: OutboxStatus,
    },

    #[error("malformed outbox entry: {0}")]
    Shape(#[from] ShapeError),
}

/// Failure reported by an applier while performing the real-world side effect.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApplyError {
    pub message: String,
    pub trace: Option<Value>,
}

impl ApplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: Value) -> Self {
        self.trace = Some(trace);
        self
    }
}
