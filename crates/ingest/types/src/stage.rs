use serde::{Deserialize, Serialize};

/// The six ordered stages of the ingestion pipeline.
///
/// Declaration order is pipeline order; `Ord` follows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageName {
    Intake,
    Validation,
    Planning,
    Execution,
    Revalidation,
    Commit,
}

impl StageName {
    /// All stages in canonical pipeline order.
    pub const ALL: [StageName; 6] = [
        StageName::Intake,
        StageName::Validation,
        StageName::Planning,
        StageName::Execution,
        StageName::Revalidation,
        StageName::Commit,
    ];

    /// Wire name, e.g. `"REVALIDATION"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Intake => "INTAKE",
            StageName::Validation => "VALIDATION",
            StageName::Planning => "PLANNING",
            StageName::Execution => "EXECUTION",
            StageName::Revalidation => "REVALIDATION",
            StageName::Commit => "COMMIT",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn position(&self) -> usize {
        match self {
            StageName::Intake => 0,
            StageName::Validation => 1,
            StageName::Planning => 2,
            StageName::Execution => 3,
            StageName::Revalidation => 4,
            StageName::Commit => 5,
        }
    }

    /// `<STAGE>_PREREQ_MISSING`
    pub fn prereq_missing_code(&self) -> String {
        format!("{}_PREREQ_MISSING", self.as_str())
    }

    /// `INVALID_<STAGE>_INPUT`
    pub fn invalid_input_code(&self) -> String {
        format!("INVALID_{}_INPUT", self.as_str())
    }

    /// `<STAGE>_INPUT_PARSE_FAILED`
    pub fn parse_failed_rule(&self) -> String {
        format!("{}_INPUT_PARSE_FAILED", self.as_str())
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
