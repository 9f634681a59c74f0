//! Pipeline configuration

use std::path::Path;

use maple_ingest_types::CommitMode;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Which commit modes Revalidation may direct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPolicy {
    pub allowed_modes: Vec<CommitMode>,
}

impl CommitPolicy {
    pub fn full_only() -> Self {
        Self {
            allowed_modes: vec![CommitMode::Full],
        }
    }

    pub fn allows(&self, mode: CommitMode) -> bool {
        self.allowed_modes.contains(&mode)
    }
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            allowed_modes: vec![CommitMode::Full, CommitMode::Partial],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Permission the actor must hold in the snapshot to submit a proposal.
    pub submit_permission: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            submit_permission: "proposal.submit".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Retry budget consulted by `can_retry` (default: 3)
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Configuration for the ingestion pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Recorded on every outbox entry (default: "proposal-ingest")
    pub pipeline_name: String,
    pub commit_policy: CommitPolicy,
    pub validation: ValidationConfig,
    pub outbox: OutboxConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "proposal-ingest".into(),
            commit_policy: CommitPolicy::default(),
            validation: ValidationConfig::default(),
            outbox: OutboxConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file. A missing file (or no path) yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, IngestError> {
        match path {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p)?;
                Self::from_toml_str(&contents)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, IngestError> {
        let config: PipelineConfig =
            toml::from_str(contents).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no pipeline can run with.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(IngestError::Config("pipeline_name must not be empty".into()));
        }
        if self.outbox.max_attempts == 0 {
            return Err(IngestError::Config("outbox.max_attempts must be at least 1".into()));
        }
        if self.commit_policy.allows(CommitMode::Unknown) {
            return Err(IngestError::Config(
                "commit_policy.allowed_modes may only list FULL and PARTIAL".into(),
            ));
        }
        Ok(())
    }
}
