use kyc_crypto::{ChainError, HasherError};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// A stored entry no longer matches its digest or its predecessor.
    /// Never repaired: the ledger must not be trusted until an operator
    /// intervenes.
    #[error("chain integrity violation at sequence {sequence}: {reason}")]
    ChainIntegrity { sequence: u64, reason: String },

    /// An entry lacks a payload field the resolver needs.
    #[error("malformed entry at sequence {sequence}: {reason}")]
    MalformedEntry { sequence: u64, reason: String },

    /// Two appends raced for the same tail. Fatal.
    #[error("concurrent append conflict: tail expected sequence {expected}, entry carries {found}")]
    ConcurrentAppend { expected: u64, found: u64 },

    #[error("journal I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<HasherError> for LedgerError {
    fn from(e: HasherError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ChainError> for LedgerError {
    fn from(e: ChainError) -> Self {
        Self::ChainIntegrity {
            sequence: e.sequence(),
            reason: e.to_string(),
        }
    }
}
