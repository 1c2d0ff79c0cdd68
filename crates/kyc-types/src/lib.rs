//! Foundation types for the KYC ledger.
//!
//! This crate provides the vocabulary shared by every other crate in the
//! workspace. It has no knowledge of hashing or storage.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte cryptographic digest binding an entry to the chain
//! - [`SubjectId`]: Applicant identifier that ledger events are correlated by
//! - [`EventKind`]: Discriminator carried by every applicant event
//! - [`Decision`]: Verifier outcome accepted by the request boundary
//! - [`VerificationStatus`]: Derived lifecycle state of an applicant

pub mod digest;
pub mod error;
pub mod status;
pub mod subject;

pub use digest::Digest;
pub use error::TypeError;
pub use status::{Decision, EventKind, VerificationStatus};
pub use subject::SubjectId;
