use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Who is acting and what they may do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub actor: String,
    pub allow: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub allowed_kinds: Vec<String>,
}

/// Point-in-time capability context consumed by Validation.
///
/// Produced by a snapshot provider and never modified by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub permissions: Permissions,
    pub scope: Scope,
    pub invariants_version: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_versions: Option<BTreeMap<String, String>>,
}

impl Snapshot {
    pub fn allows(&self, permission: &str) -> bool {
        self.permissions.allow.iter().any(|p| p == permission)
    }

    pub fn kind_allowed(&self, kind: &str) -> bool {
        self.scope.allowed_kinds.iter().any(|k| k == kind)
    }
}
