//! Append-only KYC event ledger.
//!
//! This crate is the heart of the system. It provides:
//! - Immutable, hash-linked [`Entry`] records with canonical digests
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - [`Ledger`], the single owned writer, in memory or backed by a [`Journal`]
//! - Chain validation with a per-entry [`ValidationReport`]
//! - [`StatusResolver`], which derives applicant status by folding entries

pub mod entry;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod payload;
pub mod resolver;
pub mod traits;
pub mod validation;

pub use entry::{Entry, GENESIS_PREVIOUS_DIGEST};
pub use error::{LedgerError, LedgerResult};
pub use journal::{Journal, SyncMode};
pub use ledger::{Entries, Ledger};
pub use payload::{Payload, PayloadValue};
pub use resolver::StatusResolver;
pub use traits::{LedgerReader, LedgerWriter};
pub use validation::{StreamValidator, ValidationReport, Violation, ViolationKind};
