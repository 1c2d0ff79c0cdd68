use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kyc_types::{Decision, EventKind, SubjectId, VerificationStatus};
use tracing::{info, warn};

use crate::entry::Entry;
use crate::error::LedgerResult;
use crate::ledger::Ledger;
use crate::payload::{Payload, EVENT, STATUS, SUBJECT_ID};
use crate::traits::{LedgerReader, LedgerWriter};

/// Derives applicant status by folding ledger entries.
///
/// Status is never stored: every query replays the subject's entries and the
/// highest-sequence well-formed entry wins. The resolver holds a shared
/// handle to the ledger and writes only through [`LedgerWriter::append`].
pub struct StatusResolver<L = Ledger> {
    ledger: Arc<L>,
}

impl<L> Clone for StatusResolver<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

impl<L: LedgerReader + LedgerWriter> StatusResolver<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Current derived status of `subject`.
    ///
    /// `NotFound` when no entry mentions the subject. Malformed entries are
    /// skipped with a warning; if every entry is malformed the status is
    /// `Unknown`.
    pub fn status_of(&self, subject: &SubjectId) -> LedgerResult<VerificationStatus> {
        let entries = self.ledger.entries_for_subject(subject)?;
        if entries.is_empty() {
            return Ok(VerificationStatus::NotFound);
        }
        Ok(entries
            .iter()
            .rev()
            .find_map(|entry| status_carried_by(entry))
            .unwrap_or(VerificationStatus::Unknown))
    }

    /// Subjects that have submitted and whose derived status is `Pending`,
    /// in order of first submission.
    ///
    /// Folds a single snapshot, so every subject is judged against the same
    /// ledger state.
    pub fn pending_subjects(&self) -> LedgerResult<Vec<SubjectId>> {
        let snapshot = self.ledger.all_entries()?;
        let mut submitted: Vec<SubjectId> = Vec::new();
        let mut listed: HashSet<SubjectId> = HashSet::new();
        let mut latest: HashMap<SubjectId, VerificationStatus> = HashMap::new();

        for entry in &snapshot {
            if entry.is_genesis() {
                continue;
            }
            let Some(subject) = entry
                .payload()
                .subject_id()
                .and_then(|id| SubjectId::new(id).ok())
            else {
                continue;
            };
            let Some(status) = status_carried_by(entry) else {
                continue;
            };
            if matches!(entry.event_kind(), Ok(EventKind::Submitted)) && listed.insert(subject.clone()) {
                submitted.push(subject.clone());
            }
            latest.insert(subject, status);
        }

        Ok(submitted
            .into_iter()
            .filter(|subject| latest.get(subject).is_some_and(VerificationStatus::is_pending))
            .collect())
    }

    /// Append a `SUBMITTED` entry for `subject`.
    ///
    /// `fields` are carried through uninterpreted; the subject, event and
    /// status keys are always set by the resolver.
    pub fn record_submission(&self, subject: &SubjectId, fields: Payload) -> LedgerResult<Arc<Entry>> {
        let mut payload = fields;
        payload.insert(SUBJECT_ID, subject.as_str());
        payload.insert(EVENT, EventKind::Submitted.as_str());
        payload.insert(STATUS, VerificationStatus::Pending.as_str());

        let entry = self.ledger.append(payload)?;
        info!(
            subject = %subject,
            sequence = entry.sequence(),
            "recorded submission"
        );
        Ok(entry)
    }

    /// Append a `DECIDED` entry for `subject`.
    ///
    /// The resolver accepts any [`Decision`]; whether the subject may be
    /// decided at all is a boundary policy.
    pub fn record_decision(&self, subject: &SubjectId, decision: Decision) -> LedgerResult<Arc<Entry>> {
        let payload = Payload::new()
            .with(SUBJECT_ID, subject.as_str())
            .with(EVENT, EventKind::Decided.as_str())
            .with(STATUS, decision.as_str());

        let entry = self.ledger.append(payload)?;
        info!(
            subject = %subject,
            sequence = entry.sequence(),
            decision = %decision,
            "recorded decision"
        );
        Ok(entry)
    }

    /// Every entry naming `subject`, oldest first.
    pub fn history(&self, subject: &SubjectId) -> LedgerResult<Vec<Arc<Entry>>> {
        self.ledger.entries_for_subject(subject)
    }
}

/// The status an entry establishes, or `None` for a malformed entry.
fn status_carried_by(entry: &Entry) -> Option<VerificationStatus> {
    if let Err(e) = entry.check_well_formed() {
        warn!(sequence = entry.sequence(), error = %e, "skipping malformed entry");
        return None;
    }
    if let Some(status) = entry.payload().status() {
        return Some(VerificationStatus::from_ledger_value(status));
    }
    match entry.event_kind() {
        Ok(EventKind::Submitted) => Some(VerificationStatus::Pending),
        Ok(EventKind::Decided) => Some(VerificationStatus::Unknown),
        _ => None,
    }
}
