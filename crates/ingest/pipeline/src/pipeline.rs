use maple_ingest_types::{Envelope, EnvelopeMeta, OutboxEntry, PipelineIds, StageName};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::services::StageServices;
use crate::stages::{
    CommitStage, ExecutionStage, IntakeStage, PlanningStage, RevalidationStage, ValidationStage,
};
use crate::traits::{IngestStage, SnapshotProvider};

/// Final state of one ingestion run.
#[derive(Clone, Debug)]
pub struct IngestReport {
    pub envelope: Envelope,
    /// Outbox entries emitted by Commit; empty unless Commit ran.
    pub outbox: Vec<OutboxEntry>,
}

impl IngestReport {
    pub fn committed(&self) -> bool {
        self.envelope.has_run(StageName::Commit)
    }

    pub fn halted(&self) -> bool {
        self.envelope.is_halted()
    }
}

/// The six-stage ingestion pipeline.
///
/// Stages run in canonical order over one envelope owned by this run. Once a
/// stage appends a HALT every later stage is a no-op.
pub struct IngestPipeline {
    stages: Vec<Box<dyn IngestStage>>,
    config: PipelineConfig,
}

impl IngestPipeline {
    /// Build a pipeline from explicit stages.
    ///
    /// Fail-closed: `config` must validate, and all six stages must be
    /// present, once each, in canonical order.
    pub fn new(
        stages: Vec<Box<dyn IngestStage>>,
        config: PipelineConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        let order: Vec<StageName> = stages.iter().map(|s| s.stage()).collect();
        if order != StageName::ALL {
            return Err(IngestError::PipelineMisconfigured(format!(
                "expected stages {:?}, got {:?}",
                StageName::ALL,
                order
            )));
        }
        Ok(Self { stages, config })
    }

    /// The standard six stages, configured from `config`.
    pub fn standard(config: PipelineConfig, services: StageServices) -> Result<Self, IngestError> {
        config.validate()?;
        let stages: Vec<Box<dyn IngestStage>> = vec![
            Box::new(IntakeStage::new(services.clone())),
            Box::new(ValidationStage::new(
                services.clone(),
                config.validation.clone(),
            )),
            Box::new(PlanningStage::new(services.clone())),
            Box::new(ExecutionStage::new(services.clone())),
            Box::new(RevalidationStage::new(
                services.clone(),
                config.commit_policy.clone(),
            )),
            Box::new(CommitStage::new(services, config.pipeline_name.clone())),
        ];
        Ok(Self { stages, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `envelope`.
    pub fn run(&self, envelope: Envelope) -> Envelope {
        self.stages
            .iter()
            .fold(envelope, |envelope, stage| stage.run(envelope))
    }

    /// Ingest one raw proposal: seed an envelope, run all stages, collect the outbox.
    pub fn ingest(
        &self,
        proposal_id: &str,
        raw: Value,
        snapshots: &dyn SnapshotProvider,
    ) -> IngestReport {
        info!(proposal_id = %proposal_id, pipeline = %self.config.pipeline_name, "Proposal received");

        let envelope = Envelope::new(PipelineIds::for_proposal(proposal_id))
            .with_snapshot(snapshots.snapshot())
            .with_meta(EnvelopeMeta {
                raw_proposal: Some(raw),
                source: Some(self.config.pipeline_name.clone()),
                received_at: None,
            });
        let envelope = self.run(envelope);
        let outbox = envelope
            .commit()
            .map(|record| record.outbox.clone())
            .unwrap_or_default();

        match envelope.first_halt() {
            Some(halt) => warn!(
                proposal_id = %proposal_id,
                stage = %halt.stage,
                code = %halt.code,
                "Proposal halted"
            ),
            None => info!(
                proposal_id = %proposal_id,
                outbox = outbox.len(),
                "Proposal committed"
            ),
        }

        IngestReport { envelope, outbox }
    }
}
