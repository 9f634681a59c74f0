use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical::fingerprint;
use crate::trust::TrustLevel;

/// What an effect does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectKind {
    /// Creates or updates a stored object.
    Artifact { object_id: String, kind: String },
    /// Emits a named event.
    Event {
        event_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Anything execution could not classify.
    Unknown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<Value>,
    },
}

impl EffectKind {
    pub fn label(&self) -> &'static str {
        match self {
            EffectKind::Artifact { .. } => "ARTIFACT",
            EffectKind::Event { .. } => "EVENT",
            EffectKind::Unknown { .. } => "UNKNOWN",
        }
    }
}

/// An effect produced by Execution, carried through Revalidation and Commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Deterministic id derived from the proposal id and the effect's content.
    pub stable_id: String,
    pub trust: TrustLevel,
    #[serde(flatten)]
    pub kind: EffectKind,
}

impl Effect {
    /// Build an effect, deriving its stable id.
    pub fn new(proposal_id: &str, kind: EffectKind, trust: TrustLevel) -> Self {
        Self {
            stable_id: Self::derive_stable_id(proposal_id, &kind),
            trust,
            kind,
        }
    }

    pub fn artifact(
        proposal_id: &str,
        object_id: impl Into<String>,
        kind: impl Into<String>,
        trust: TrustLevel,
    ) -> Self {
        Self::new(
            proposal_id,
            EffectKind::Artifact {
                object_id: object_id.into(),
                kind: kind.into(),
            },
            trust,
        )
    }

    pub fn event(
        proposal_id: &str,
        event_name: impl Into<String>,
        payload: Option<Value>,
        trust: TrustLevel,
    ) -> Self {
        Self::new(
            proposal_id,
            EffectKind::Event {
                event_name: event_name.into(),
                payload,
            },
            trust,
        )
    }

    pub fn unknown(proposal_id: &str, raw: Option<Value>, trust: TrustLevel) -> Self {
        Self::new(proposal_id, EffectKind::Unknown { raw }, trust)
    }

    /// Stable id: fingerprint of the proposal id plus the effect's identifying fields.
    ///
    /// Trust is not part of the id; promotion keeps identity.
    pub fn derive_stable_id(proposal_id: &str, kind: &EffectKind) -> String {
        let identity = match kind {
            EffectKind::Artifact { object_id, kind } => json!({
                "proposalId": proposal_id,
                "type": "ARTIFACT",
                "objectId": object_id,
                "kind": kind,
            }),
            EffectKind::Event {
                event_name,
                payload,
            } => json!({
                "proposalId": proposal_id,
                "type": "EVENT",
                "eventName": event_name,
                "payload": payload,
            }),
            EffectKind::Unknown { raw } => json!({
                "proposalId": proposal_id,
                "type": "UNKNOWN",
                "raw": raw,
            }),
        };
        fingerprint(&identity)
    }

    /// Object id of an ARTIFACT effect.
    pub fn object_id(&self) -> Option<&str> {
        match &self.kind {
            EffectKind::Artifact { object_id, .. } => Some(object_id),
            _ => None,
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self.kind, EffectKind::Artifact { .. })
    }

    /// Same effect at a different trust level.
    pub fn with_trust(&self, trust: TrustLevel) -> Self {
        Self {
            trust,
            ..self.clone()
        }
    }
}

/// Everything Execution produced for one proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectsLog {
    pub proposal_id: String,
    pub effects: Vec<Effect>,
}

impl EffectsLog {
    pub fn new(proposal_id: impl Into<String>, effects: Vec<Effect>) -> Self {
        Self {
            proposal_id: proposal_id.into(),
            effects,
        }
    }

    /// Known ARTIFACT object ids, in production order.
    pub fn artifact_ids(&self) -> impl Iterator<Item = &str> {
        self.effects.iter().filter_map(Effect::object_id)
    }
}
