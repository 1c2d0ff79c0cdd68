//! Cryptographic primitives for the KYC ledger.
//!
//! Provides a deterministic canonical encoder, domain-separated BLAKE3
//! hashing, and hash chain verification for sequence-numbered entries.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod canonical;
pub mod chain;
pub mod hasher;

pub use canonical::{canonical_bytes, canonical_string};
pub use chain::{ChainError, ChainLinked, HashChainVerifier};
pub use hasher::{EntryHasher, HasherError};
