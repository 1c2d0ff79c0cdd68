use kyc_crypto::{ChainError, EntryHasher, HashChainVerifier};
use kyc_types::Digest;
use serde::Serialize;

use crate::entry::{Entry, GENESIS_PREVIOUS_DIGEST};
use crate::error::LedgerError;
use crate::traits::LedgerReader;

/// Result of a full ledger audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub entry_count: u64,
    pub head_digest: Option<Digest>,
    /// Chain integrity violations. Any entry here makes the ledger untrusted.
    pub violations: Vec<Violation>,
    /// Entries that hash correctly but that the status resolver will skip.
    pub malformed: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if the chain is intact.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Lowest sequence number with an integrity violation.
    pub fn first_offender(&self) -> Option<u64> {
        self.violations.iter().map(|v| v.sequence).min()
    }
}

/// A specific problem found during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub sequence: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    SequenceGap,
    GenesisLink,
    BrokenLink,
    DigestMismatch,
    Unencodable,
    MalformedEntry,
}

impl From<ChainError> for Violation {
    fn from(e: ChainError) -> Self {
        let kind = match &e {
            ChainError::SequenceGap { .. } => ViolationKind::SequenceGap,
            ChainError::GenesisLink { .. } => ViolationKind::GenesisLink,
            ChainError::BrokenLink { .. } => ViolationKind::BrokenLink,
            ChainError::DigestMismatch { .. } => ViolationKind::DigestMismatch,
            ChainError::Unhashable { .. } => ViolationKind::Unencodable,
        };
        Self {
            sequence: e.sequence(),
            kind,
            description: e.to_string(),
        }
    }
}

/// Ledger integrity validator.
pub struct StreamValidator;

impl StreamValidator {
    /// Audit every entry a reader exposes.
    pub fn validate<R: LedgerReader + ?Sized>(reader: &R) -> Result<ValidationReport, LedgerError> {
        let entries = reader.all_entries()?;
        Ok(Self::validate_entries(&entries, reader.hasher()))
    }

    /// Audit a sequence of entries that is not (yet) behind a ledger, e.g.
    /// the contents of a journal read from disk.
    pub fn validate_entries<'a, I>(entries: I, hasher: EntryHasher) -> ValidationReport
    where
        I: IntoIterator<Item = &'a Entry>,
        I::IntoIter: Clone,
    {
        let entries = entries.into_iter();
        let verifier = HashChainVerifier::new(hasher, GENESIS_PREVIOUS_DIGEST);
        let violations = verifier
            .violations(entries.clone())
            .into_iter()
            .map(Violation::from)
            .collect();

        let mut entry_count = 0u64;
        let mut head_digest = None;
        let mut malformed = Vec::new();
        for (position, entry) in entries.enumerate() {
            entry_count += 1;
            head_digest = Some(entry.digest());
            if let Err(LedgerError::MalformedEntry { reason, .. }) = entry.check_well_formed() {
                malformed.push(Violation {
                    sequence: position as u64,
                    kind: ViolationKind::MalformedEntry,
                    description: reason,
                });
            }
        }

        ValidationReport {
            entry_count,
            head_digest,
            violations,
            malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ledger::Ledger;
    use crate::payload::{Payload, EVENT, STATUS, SUBJECT_ID};
    use crate::traits::LedgerWriter;

    fn submitted(subject: &str) -> Payload {
        Payload::new()
            .with(SUBJECT_ID, subject)
            .with(EVENT, "SUBMITTED")
            .with(STATUS, "PENDING")
    }

    #[test]
    fn fresh_ledger_is_valid() {
        let ledger = Ledger::new().unwrap();
        let report = StreamValidator::validate(&ledger).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entry_count, 1);
        assert_eq!(report.first_offender(), None);
        assert_eq!(report.head_digest, Some(ledger.head().unwrap().digest()));
    }

    #[test]
    fn valid_ledger_with_applicants_passes() {
        let ledger = Ledger::new().unwrap();
        ledger.append(submitted("A")).unwrap();
        ledger.append(submitted("B")).unwrap();
        let report = ledger.validation_report().unwrap();
        assert!(report.is_valid());
        assert!(report.malformed.is_empty());
        assert_eq!(report.entry_count, 3);
    }

    #[test]
    fn reports_every_tampered_entry() {
        let ledger = Ledger::new().unwrap();
        for subject in ["A", "B", "C", "D"] {
            ledger.append(submitted(subject)).unwrap();
        }
        let mut entries: Vec<Entry> = ledger
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| (*e).clone())
            .collect();
        entries[2].payload.insert(STATUS, "VERIFIED");
        entries[4].previous_digest = Digest::from_hash([7; 32]);

        let report = StreamValidator::validate_entries(&entries, EntryHasher::ENTRY);
        assert!(!report.is_valid());
        assert_eq!(report.first_offender(), Some(2));
        assert!(report.violations.iter().any(|v| v.sequence == 2
            && v.kind == ViolationKind::DigestMismatch));
        assert!(report
            .violations
            .iter()
            .any(|v| v.sequence == 4 && v.kind == ViolationKind::BrokenLink));
    }

    #[test]
    fn forged_sequence_is_blamed_on_its_position() {
        let ledger = Ledger::new().unwrap();
        for subject in ["A", "B", "C", "D"] {
            ledger.append(submitted(subject)).unwrap();
        }
        let mut entries: Vec<Entry> = ledger
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| (*e).clone())
            .collect();
        entries[2].sequence = 0;

        let report = StreamValidator::validate_entries(&entries, EntryHasher::ENTRY);
        assert_eq!(report.first_offender(), Some(2));
        assert!(report
            .violations
            .iter()
            .any(|v| v.sequence == 2 && v.kind == ViolationKind::SequenceGap));
        assert!(report.violations.iter().all(|v| v.sequence == 2));
    }

    #[test]
    fn malformed_entries_do_not_break_the_chain() {
        let ledger = Ledger::new().unwrap();
        ledger.append(submitted("A")).unwrap();
        ledger
            .append(Payload::new().with(SUBJECT_ID, "A").with(EVENT, "ARCHIVED"))
            .unwrap();

        let report = ledger.validation_report().unwrap();
        assert!(report.is_valid());
        assert_eq!(report.malformed.len(), 1);
        assert_eq!(report.malformed[0].sequence, 2);
        assert_eq!(report.malformed[0].kind, ViolationKind::MalformedEntry);
    }

    #[test]
    fn validates_through_trait_object() {
        let ledger: Arc<dyn LedgerReader> = Arc::new(Ledger::new().unwrap());
        let report = StreamValidator::validate(ledger.as_ref()).unwrap();
        assert!(report.is_valid());
    }

    #[test]
    fn report_serializes_for_api_clients() {
        let ledger = Ledger::new().unwrap();
        let json = serde_json::to_value(ledger.validation_report().unwrap()).unwrap();
        assert_eq!(json["entryCount"], 1);
        assert!(json["violations"].as_array().unwrap().is_empty());
    }
}
