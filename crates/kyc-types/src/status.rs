use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Discriminator carried in the `event` field of every ledger payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// The fixed first entry of every ledger.
    Genesis,
    /// An applicant submitted their profile and document.
    Submitted,
    /// A verifier recorded a decision for an applicant.
    Decided,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genesis => "GENESIS",
            Self::Submitted => "SUBMITTED",
            Self::Decided => "DECIDED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GENESIS" => Ok(Self::Genesis),
            "SUBMITTED" => Ok(Self::Submitted),
            "DECIDED" => Ok(Self::Decided),
            other => Err(TypeError::UnknownEvent(other.to_string())),
        }
    }
}

/// Verifier outcome.
///
/// This is the contract the request boundary upholds: only these two values
/// are ever recorded as decisions. The ledger itself stores whatever status
/// string it is given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Verified,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VERIFIED" => Ok(Self::Verified),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(TypeError::InvalidDecision(other.to_string())),
        }
    }
}

impl From<Decision> for VerificationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Verified => Self::Verified,
            Decision::Rejected => Self::Rejected,
        }
    }
}

/// Derived lifecycle state of an applicant.
///
/// Never stored as a mutable field: it is recomputed from the applicant's
/// ledger entries on every query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum VerificationStatus {
    /// No entry mentions the applicant.
    NotFound,
    /// Submitted, no decision yet.
    Pending,
    Verified,
    Rejected,
    /// The latest entry is a decision that carries no status.
    Unknown,
    /// A status string outside the known set, reported verbatim.
    Other(String),
}

impl VerificationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
            Self::Other(s) => s,
        }
    }

    /// Interpret a `status` value read from a ledger payload.
    pub fn from_ledger_value(value: &str) -> Self {
        match value {
            "NOT_FOUND" => Self::NotFound,
            "PENDING" => Self::Pending,
            "VERIFIED" => Self::Verified,
            "REJECTED" => Self::Rejected,
            "UNKNOWN" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<VerificationStatus> for String {
    fn from(status: VerificationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl From<String> for VerificationStatus {
    fn from(value: String) -> Self {
        Self::from_ledger_value(&value)
    }
}
