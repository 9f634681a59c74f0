use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One requested operation inside a proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateArtifact {
        object_id: String,
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    EmitEvent {
        event_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Passed through untouched; execution records it as an UNKNOWN effect.
    Other {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<Value>,
    },
}

/// Typed form of the untrusted proposal received at Intake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Proposal {
    pub actor: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub operations: Vec<Operation>,
}

impl Proposal {
    /// Artifact kinds requested, in operation order (may repeat).
    pub fn artifact_kinds(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().filter_map(|op| match op {
            Operation::CreateArtifact { kind, .. } => Some(kind.as_str()),
            _ => None,
        })
    }

    /// Artifact object ids requested, in operation order (may repeat).
    pub fn artifact_ids(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().filter_map(|op| match op {
            Operation::CreateArtifact { object_id, .. } => Some(object_id.as_str()),
            _ => None,
        })
    }
}
