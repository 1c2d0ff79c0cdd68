use kyc_types::Digest;
use serde::Serialize;

use crate::canonical::canonical_bytes;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag (e.g., `"kyc-entry-v1"`) that is
/// prepended to every hash computation, so a ledger entry and a profile with
/// identical canonical bytes still produce different digests. A ledger is
/// built and validated with exactly one hasher for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHasher {
    domain: &'static str,
}

impl EntryHasher {
    /// Hasher for ledger entries.
    pub const ENTRY: Self = Self {
        domain: "kyc-entry-v1",
    };
    /// Hasher for applicant profile fingerprints.
    pub const PROFILE: Self = Self {
        domain: "kyc-profile-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash the canonical encoding of a serializable value.
    pub fn hash_canonical<T: Serialize + ?Sized>(&self, value: &T) -> Result<Digest, HasherError> {
        Ok(self.hash(&canonical_bytes(value)?))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for EntryHasher {
    fn default() -> Self {
        Self::ENTRY
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
