use serde::{Deserialize, Serialize};

/// Provenance confidence of a produced artifact.
///
/// Ordered `UNTRUSTED < PROVISIONAL < COMMITTED < DERIVED`. Trust only
/// moves forward, and only the Commit stage may produce `COMMITTED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    Untrusted,
    Provisional,
    Committed,
    Derived,
}

impl TrustLevel {
    pub fn rank(&self) -> u8 {
        match self {
            TrustLevel::Untrusted => 0,
            TrustLevel::Provisional => 1,
            TrustLevel::Committed => 2,
            TrustLevel::Derived => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Untrusted => "UNTRUSTED",
            TrustLevel::Provisional => "PROVISIONAL",
            TrustLevel::Committed => "COMMITTED",
            TrustLevel::Derived => "DERIVED",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
