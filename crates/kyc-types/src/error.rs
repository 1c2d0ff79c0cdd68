use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown event kind: {0}")]
    UnknownEvent(String),

    #[error("invalid decision {0:?}: expected VERIFIED or REJECTED")]
    InvalidDecision(String),

    #[error("subject identifier must not be empty")]
    EmptySubjectId,
}
