use std::sync::Arc;

use chrono::{DateTime, Utc};
use maple_ingest_types::fingerprint;
use serde_json::Value;

use crate::checker::StructuralChecker;
use crate::traits::{Clock, ContractChecker, Fingerprinter, IdProvider, PromotionPolicy};
use crate::trust::LatticePolicy;

/// Ids of the form `<kind>_<uuid-v4-simple>`.
#[derive(Clone, Debug, Default)]
pub struct UuidIdProvider;

impl IdProvider for UuidIdProvider {
    fn new_id(&self, kind: &str) -> String {
        format!("{}_{}", kind, uuid::Uuid::new_v4().simple())
    }
}

/// BLAKE3 over canonical (key-sorted) JSON.
#[derive(Clone, Debug, Default)]
pub struct Blake3Fingerprinter;

impl Fingerprinter for Blake3Fingerprinter {
    fn fingerprint(&self, value: &Value) -> String {
        fingerprint(value)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// External collaborators shared by every stage.
#[derive(Clone)]
pub struct StageServices {
    pub checker: Arc<dyn ContractChecker>,
    pub ids: Arc<dyn IdProvider>,
    pub fingerprinter: Arc<dyn Fingerprinter>,
    pub clock: Arc<dyn Clock>,
    pub promotion: Arc<dyn PromotionPolicy>,
}

impl StageServices {
    /// Production defaults: structural checker, uuid ids, BLAKE3 fingerprints,
    /// system clock and the lattice promotion rules.
    pub fn standard() -> Self {
        Self {
            checker: Arc::new(StructuralChecker),
            ids: Arc::new(UuidIdProvider),
            fingerprinter: Arc::new(Blake3Fingerprinter),
            clock: Arc::new(SystemClock),
            promotion: Arc::new(LatticePolicy),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn ContractChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdProvider>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_promotion(mut self, promotion: Arc<dyn PromotionPolicy>) -> Self {
        self.promotion = promotion;
        self
    }
}

impl Default for StageServices {
    fn default() -> Self {
        Self::standard()
    }
}
