use kyc_types::Digest;

use crate::hasher::{EntryHasher, HasherError};

/// Trait for records that participate in a sequence-numbered hash chain.
pub trait ChainLinked {
    /// Position in the chain (0 for genesis).
    fn sequence(&self) -> u64;
    /// The record's own stored digest.
    fn digest(&self) -> Digest;
    /// The stored digest of the preceding record.
    fn previous_digest(&self) -> Digest;
    /// Canonical bytes of every hashed field (everything except `digest`).
    fn header_bytes(&self) -> Result<Vec<u8>, HasherError>;
}

/// Hash chain integrity verifier.
///
/// Checks, for every record in order:
/// 1. its sequence number equals its position
/// 2. its previous digest equals the preceding record's digest, or the
///    genesis sentinel for the first record
/// 3. its digest equals the hash of its own header bytes
pub struct HashChainVerifier {
    hasher: EntryHasher,
    genesis_previous: Digest,
}

impl HashChainVerifier {
    pub fn new(hasher: EntryHasher, genesis_previous: Digest) -> Self {
        Self {
            hasher,
            genesis_previous,
        }
    }

    /// Recompute the digest a record should carry.
    pub fn compute_digest(&self, record: &impl ChainLinked) -> Result<Digest, HasherError> {
        Ok(self.hasher.hash(&record.header_bytes()?))
    }

    /// Verify a chain, stopping at the first offending record.
    pub fn verify_chain<'a, T, I>(&self, records: I) -> Result<(), ChainError>
    where
        T: ChainLinked + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut previous: Option<Digest> = None;
        for (index, record) in records.into_iter().enumerate() {
            if let Some(error) = self.check(index as u64, previous, record).into_iter().next() {
                return Err(error);
            }
            previous = Some(record.digest());
        }
        Ok(())
    }

    /// Collect every violation in the chain, in sequence order.
    pub fn violations<'a, T, I>(&self, records: I) -> Vec<ChainError>
    where
        T: ChainLinked + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut previous: Option<Digest> = None;
        let mut found = Vec::new();
        for (index, record) in records.into_iter().enumerate() {
            found.extend(self.check(index as u64, previous, record));
            previous = Some(record.digest());
        }
        found
    }

    /// Violations are tagged with the record's position, never with its
    /// stored sequence number, which may itself be forged.
    fn check(&self, index: u64, previous: Option<Digest>, record: &impl ChainLinked) -> Vec<ChainError> {
        let mut errors = Vec::new();
        let sequence = index;

        if record.sequence() != index {
            errors.push(ChainError::SequenceGap {
                expected: index,
                found: record.sequence(),
            });
        }

        let expected_prev = previous.unwrap_or(self.genesis_previous);
        if record.previous_digest() != expected_prev {
            errors.push(if previous.is_none() {
                ChainError::GenesisLink { sequence }
            } else {
                ChainError::BrokenLink { sequence }
            });
        }

        match self.compute_digest(record) {
            Ok(computed) if computed == record.digest() => {}
            Ok(_) => errors.push(ChainError::DigestMismatch { sequence }),
            Err(e) => errors.push(ChainError::Unhashable {
                sequence,
                reason: e.to_string(),
            }),
        }

        errors
    }
}

/// Errors from chain verification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("genesis entry {sequence} does not link to the genesis sentinel")]
    GenesisLink { sequence: u64 },

    #[error("broken link at sequence {sequence}: previous digest does not match predecessor")]
    BrokenLink { sequence: u64 },

    #[error("digest mismatch at sequence {sequence}: recomputed digest differs from stored")]
    DigestMismatch { sequence: u64 },

    #[error("entry {sequence} cannot be encoded: {reason}")]
    Unhashable { sequence: u64, reason: String },
}

impl ChainError {
    /// Position of the offending record in the chain.
    pub fn sequence(&self) -> u64 {
        match self {
            Self::SequenceGap { expected, .. } => *expected,
            Self::GenesisLink { sequence }
            | Self::BrokenLink { sequence }
            | Self::DigestMismatch { sequence }
            | Self::Unhashable { sequence, .. } => *sequence,
        }
    }
}
