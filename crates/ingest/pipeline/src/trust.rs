//! Trust promotion guard.
//!
//! Stateless policy over the lattice `UNTRUSTED < PROVISIONAL < COMMITTED < DERIVED`:
//! trust only moves forward and only the Commit stage may produce COMMITTED.

use maple_ingest_types::{codes, Effect, StageName, TrustLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::PromotionPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromotionRequest {
    pub from: TrustLevel,
    pub to: TrustLevel,
    pub stage: StageName,
    pub reason: String,
}

impl PromotionRequest {
    pub fn new(from: TrustLevel, to: TrustLevel, stage: StageName, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            stage,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromotionRejection {
    pub code: &'static str,
    pub message: String,
}

impl PromotionRejection {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Decide a typed promotion request.
pub fn promote(request: &PromotionRequest) -> Result<(), PromotionRejection> {
    if request.reason.trim().is_empty() {
        return Err(PromotionRejection::new(
            codes::INVALID_REQUEST,
            "promotion reason must not be empty",
        ));
    }
    if request.from == request.to {
        return Err(PromotionRejection::new(
            codes::NO_OP,
            format!("trust is already {}", request.to),
        ));
    }
    if request.to.rank() < request.from.rank() {
        return Err(PromotionRejection::new(
            codes::TRUST_DOWNGRADE_FORBIDDEN,
            format!("cannot move trust from {} down to {}", request.from, request.to),
        ));
    }
    if request.to == TrustLevel::Committed && request.stage != StageName::Commit {
        return Err(PromotionRejection::new(
            codes::COMMIT_STAGE_REQUIRED,
            format!("only COMMIT may promote to COMMITTED, not {}", request.stage),
        ));
    }
    Ok(())
}

/// The lattice rules of [`promote`], the same for every effect.
#[derive(Clone, Debug, Default)]
pub struct LatticePolicy;

impl PromotionPolicy for LatticePolicy {
    fn check(&self, _effect: &Effect, request: &PromotionRequest) -> Result<(), PromotionRejection> {
        promote(request)
    }
}

/// Decide an untyped request; any shape problem is `INVALID_REQUEST`.
pub fn promote_value(request: &Value) -> Result<(), PromotionRejection> {
    let request: PromotionRequest = serde_json::from_value(request.clone()).map_err(|e| {
        PromotionRejection::new(codes::INVALID_REQUEST, format!("malformed promotion request: {}", e))
    })?;
    promote(&request)
}
