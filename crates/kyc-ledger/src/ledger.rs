use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use kyc_crypto::{EntryHasher, HashChainVerifier};
use tracing::{debug, error, info};

use crate::entry::{Entry, GENESIS_PREVIOUS_DIGEST};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::{Journal, SyncMode};
use crate::payload::Payload;
use crate::traits::{LedgerReader, LedgerWriter};
use crate::validation::{StreamValidator, ValidationReport};

/// The single authoritative, append-only entry sequence.
///
/// A `Ledger` owns its entries and is the only code that assigns sequence
/// numbers or computes digests. Share it behind an `Arc`; there is no global
/// instance.
///
/// Appends are serialized by `append_lock` for the whole
/// "read tail, seal, journal, publish" step. Readers only take the `entries`
/// read lock long enough to copy out the entry handles, and an entry becomes
/// visible only once it is fully sealed and journaled.
#[derive(Debug)]
pub struct Ledger {
    hasher: EntryHasher,
    entries: RwLock<Vec<Arc<Entry>>>,
    append_lock: Mutex<()>,
    journal: Option<Journal>,
}

impl Ledger {
    /// Create an in-memory ledger holding only the genesis entry.
    pub fn new() -> LedgerResult<Self> {
        Self::with_hasher(EntryHasher::ENTRY)
    }

    pub fn with_hasher(hasher: EntryHasher) -> LedgerResult<Self> {
        let genesis = Entry::genesis(hasher)?;
        Ok(Self::assemble(hasher, vec![genesis], None))
    }

    /// Open a journal-backed ledger.
    ///
    /// An empty journal is initialized with the genesis entry. An existing one
    /// is replayed and validated; any integrity failure aborts the open.
    pub fn open(path: &Path, sync_mode: SyncMode) -> LedgerResult<Self> {
        let hasher = EntryHasher::ENTRY;
        let journal = Journal::open(path, sync_mode)?;
        let recovery = journal.recover()?;
        if recovery.torn_tail {
            journal.truncate_to(recovery.valid_len)?;
        }

        let entries = if recovery.entries.is_empty() {
            let genesis = Entry::genesis(hasher)?;
            journal.append(&genesis)?;
            info!(path = %path.display(), digest = %genesis.digest().short_hex(), "initialized ledger");
            vec![genesis]
        } else {
            recovery.entries
        };

        let ledger = Self::assemble(hasher, entries, Some(journal));
        ledger.validate()?;
        info!(
            path = %path.display(),
            entries = ledger.len()?,
            "opened ledger"
        );
        Ok(ledger)
    }

    /// Rebuild an in-memory ledger from previously persisted entries.
    ///
    /// The entries are validated before the ledger is returned.
    pub fn from_entries(entries: Vec<Entry>, hasher: EntryHasher) -> LedgerResult<Self> {
        if entries.is_empty() {
            return Err(LedgerError::ChainIntegrity {
                sequence: 0,
                reason: "ledger has no genesis entry".into(),
            });
        }
        let ledger = Self::assemble(hasher, entries, None);
        ledger.validate()?;
        Ok(ledger)
    }

    fn assemble(hasher: EntryHasher, entries: Vec<Entry>, journal: Option<Journal>) -> Self {
        Self {
            hasher,
            entries: RwLock::new(entries.into_iter().map(Arc::new).collect()),
            append_lock: Mutex::new(()),
            journal,
        }
    }

    /// Check chain integrity (previous-digest links and digest correctness).
    ///
    /// Fails with [`LedgerError::ChainIntegrity`] naming the first offending
    /// sequence number.
    pub fn validate(&self) -> LedgerResult<()> {
        let snapshot = self.all_entries()?;
        HashChainVerifier::new(self.hasher, GENESIS_PREVIOUS_DIGEST)
            .verify_chain(&snapshot)
            .map_err(|e| {
                error!(sequence = e.sequence(), error = %e, "ledger failed validation");
                LedgerError::from(e)
            })
    }

    /// Full report of every violation and malformed entry.
    pub fn validation_report(&self) -> LedgerResult<ValidationReport> {
        StreamValidator::validate(self)
    }

    /// Number of entries, genesis included.
    pub fn len(&self) -> LedgerResult<u64> {
        Ok(self.read_entries()?.len() as u64)
    }

    /// Always `false` for a constructed ledger; genesis is never removed.
    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.read_entries()?.is_empty())
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_ref().map(Journal::path)
    }

    fn read_entries(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, Vec<Arc<Entry>>>> {
        self.entries.read().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl LedgerWriter for Ledger {
    fn append(&self, payload: Payload) -> LedgerResult<Arc<Entry>> {
        let _writer = self.append_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;

        let (sequence, previous_digest) = {
            let entries = self.read_entries()?;
            let tail = entries.last().ok_or_else(|| LedgerError::ChainIntegrity {
                sequence: 0,
                reason: "ledger has no genesis entry".into(),
            })?;
            (tail.sequence() + 1, tail.digest())
        };

        let entry = Entry::seal(sequence, Utc::now(), payload, previous_digest, self.hasher)?;
        if let Some(journal) = &self.journal {
            journal.append(&entry)?;
        }

        let entry = Arc::new(entry);
        let mut entries = self.entries.write().map_err(|_| LedgerError::LockPoisoned)?;
        let expected = entries.len() as u64;
        if expected != entry.sequence() {
            error!(
                expected,
                found = entry.sequence(),
                "append raced another writer; refusing to publish"
            );
            return Err(LedgerError::ConcurrentAppend {
                expected,
                found: entry.sequence(),
            });
        }
        entries.push(Arc::clone(&entry));

        debug!(
            sequence = entry.sequence(),
            digest = %entry.digest().short_hex(),
            "appended entry"
        );
        Ok(entry)
    }
}

impl LedgerReader for Ledger {
    fn all_entries(&self) -> LedgerResult<Entries> {
        Ok(Entries {
            entries: self.read_entries()?.clone(),
        })
    }

    fn hasher(&self) -> EntryHasher {
        self.hasher
    }
}

/// Point-in-time snapshot of the ledger, in ascending sequence order.
///
/// Holds shared handles, not copies. Iterate it as many times as needed;
/// appends made after the snapshot was taken are not visible through it.
#[derive(Clone, Debug, Default)]
pub struct Entries {
    entries: Vec<Arc<Entry>>,
}

impl Entries {
    pub fn iter(&self) -> EntriesIter<'_> {
        EntriesIter(self.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, sequence: u64) -> Option<&Arc<Entry>> {
        usize::try_from(sequence).ok().and_then(|i| self.entries.get(i))
    }

    pub fn last(&self) -> Option<&Arc<Entry>> {
        self.entries.last()
    }
}

impl From<Vec<Arc<Entry>>> for Entries {
    fn from(entries: Vec<Arc<Entry>>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for Entries {
    type Item = Arc<Entry>;
    type IntoIter = std::vec::IntoIter<Arc<Entry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Entries {
    type Item = &'a Entry;
    type IntoIter = EntriesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over an [`Entries`] snapshot.
#[derive(Clone)]
pub struct EntriesIter<'a>(std::slice::Iter<'a, Arc<Entry>>);

impl<'a> Iterator for EntriesIter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(Arc::as_ref)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl DoubleEndedIterator for EntriesIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(Arc::as_ref)
    }
}

impl ExactSizeIterator for EntriesIter<'_> {}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use std::thread;

    use kyc_types::{Digest, SubjectId};
    use proptest::prelude::*;

    use super::*;
    use crate::journal::encode_frame;
    use crate::payload::{EVENT, STATUS, SUBJECT_ID};

    fn event(subject: &str, event: &str, status: &str) -> Payload {
        Payload::new()
            .with(SUBJECT_ID, subject)
            .with(EVENT, event)
            .with(STATUS, status)
    }

    #[test]
    fn new_ledger_holds_only_genesis() {
        let ledger = Ledger::new().unwrap();
        let entries = ledger.all_entries().unwrap();
        assert_eq!(entries.len(), 1);
        let genesis = entries.get(0).unwrap();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.previous_digest(), GENESIS_PREVIOUS_DIGEST);
        ledger.validate().unwrap();
    }

    #[test]
    fn append_assigns_dense_sequence_and_links_digests() {
        let ledger = Ledger::new().unwrap();
        for i in 0..10 {
            let entry = ledger
                .append(event(&format!("s{i}"), "SUBMITTED", "PENDING"))
                .unwrap();
            assert_eq!(entry.sequence(), i + 1);
        }

        let entries = ledger.all_entries().unwrap();
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence(), i as u64);
            if i > 0 {
                let prev = entries.get(i as u64 - 1).unwrap();
                assert_eq!(entry.previous_digest(), prev.digest());
            }
        }
        ledger.validate().unwrap();
    }

    #[test]
    fn entries_for_subject_preserves_order() {
        let ledger = Ledger::new().unwrap();
        ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
        ledger.append(event("B", "SUBMITTED", "PENDING")).unwrap();
        ledger.append(event("A", "DECIDED", "VERIFIED")).unwrap();

        let a = SubjectId::new("A").unwrap();
        let seqs: Vec<u64> = ledger
            .entries_for_subject(&a)
            .unwrap()
            .iter()
            .map(|e| e.sequence())
            .collect();
        assert_eq!(seqs, vec![1, 3]);

        let nobody = SubjectId::new("nobody").unwrap();
        assert!(ledger.entries_for_subject(&nobody).unwrap().is_empty());
    }

    #[test]
    fn snapshots_do_not_see_later_appends() {
        let ledger = Ledger::new().unwrap();
        let before = ledger.all_entries().unwrap();
        ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(ledger.all_entries().unwrap().len(), 2);
    }

    #[test]
    fn tampered_payload_fails_validation_at_that_sequence() {
        let ledger = Ledger::new().unwrap();
        ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
        ledger.append(event("A", "DECIDED", "REJECTED")).unwrap();
        ledger.append(event("B", "SUBMITTED", "PENDING")).unwrap();

        {
            let mut guard = ledger.entries.write().unwrap();
            let mut forged = (*guard[2]).clone();
            forged.payload.insert(STATUS, "VERIFIED");
            guard[2] = Arc::new(forged);
        }

        let err = ledger.validate().unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 2, .. }));
    }

    #[test]
    fn tampered_timestamp_fails_validation_at_that_sequence() {
        let ledger = Ledger::new().unwrap();
        ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
        ledger.append(event("A", "DECIDED", "VERIFIED")).unwrap();

        {
            let mut guard = ledger.entries.write().unwrap();
            let mut forged = (*guard[1]).clone();
            forged.timestamp = forged.timestamp + chrono::Duration::seconds(60);
            guard[1] = Arc::new(forged);
        }

        let err = ledger.validate().unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 1, .. }));
    }

    fn tampered(forge: impl FnOnce(&mut Entry)) -> LedgerError {
        let ledger = Ledger::new().unwrap();
        for subject in ["A", "B", "C", "D"] {
            ledger.append(event(subject, "SUBMITTED", "PENDING")).unwrap();
        }
        {
            let mut guard = ledger.entries.write().unwrap();
            let mut forged = (*guard[2]).clone();
            forge(&mut forged);
            guard[2] = Arc::new(forged);
        }
        ledger.validate().unwrap_err()
    }

    #[test]
    fn tampered_sequence_fails_validation_at_its_position() {
        let err = tampered(|entry| entry.sequence = 0);
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 2, .. }));

        let err = tampered(|entry| entry.sequence = 9);
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 2, .. }));
    }

    #[test]
    fn tampered_previous_digest_fails_validation_at_that_sequence() {
        let err = tampered(|entry| entry.previous_digest = Digest::from_hash([3; 32]));
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 2, .. }));
    }

    #[test]
    fn tampered_digest_fails_validation_at_that_sequence() {
        let err = tampered(|entry| entry.digest = Digest::from_hash([5; 32]));
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 2, .. }));
    }

    #[test]
    fn resealed_entry_breaks_the_following_link() {
        let err = tampered(|entry| {
            entry.payload.insert(STATUS, "VERIFIED");
            entry.digest = HashChainVerifier::new(EntryHasher::ENTRY, GENESIS_PREVIOUS_DIGEST)
                .compute_digest(&*entry)
                .unwrap();
        });
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 3, .. }));
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        let ledger = Arc::new(Ledger::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..25 {
                        ledger
                            .append(event(&format!("t{t}-{i}"), "SUBMITTED", "PENDING"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len().unwrap(), 1 + 8 * 25);
        ledger.validate().unwrap();
    }

    #[test]
    fn journal_backed_ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("ledger.journal");

        let head = {
            let ledger = Ledger::open(&path, SyncMode::default()).unwrap();
            ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
            ledger.append(event("A", "DECIDED", "VERIFIED")).unwrap()
        };

        let reopened = Ledger::open(&path, SyncMode::default()).unwrap();
        assert_eq!(reopened.len().unwrap(), 3);
        assert_eq!(reopened.head().unwrap().as_ref(), head.as_ref());

        let next = reopened.append(event("B", "SUBMITTED", "PENDING")).unwrap();
        assert_eq!(next.sequence(), 3);
        assert_eq!(next.previous_digest(), head.digest());
    }

    #[test]
    fn independent_ledgers_share_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let on_disk = Ledger::open(&dir.path().join("a.journal"), SyncMode::default()).unwrap();
        let in_memory = Ledger::new().unwrap();
        assert_eq!(
            on_disk.head().unwrap().digest(),
            in_memory.head().unwrap().digest()
        );
    }

    #[test]
    fn reopening_a_rewritten_journal_reports_first_offender() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");

        let ledger = Ledger::open(&path, SyncMode::default()).unwrap();
        ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
        ledger.append(event("A", "DECIDED", "REJECTED")).unwrap();
        ledger.append(event("B", "SUBMITTED", "PENDING")).unwrap();
        let mut entries: Vec<Entry> = ledger
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| (*e).clone())
            .collect();
        drop(ledger);

        // Rewrite history with valid framing but a forged decision.
        entries[2].payload.insert(STATUS, "VERIFIED");
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        for entry in &entries {
            let bytes = serde_json::to_vec(entry).unwrap();
            file.write_all(&encode_frame(&bytes).unwrap()).unwrap();
        }
        drop(file);

        let err = Ledger::open(&path, SyncMode::default()).err().unwrap();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 2, .. }));
    }

    #[test]
    fn damaged_length_header_fails_open_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        let ledger = Ledger::open(&path, SyncMode::default()).unwrap();
        for subject in ["A", "B", "C", "D"] {
            ledger.append(event(subject, "SUBMITTED", "PENDING")).unwrap();
        }
        let genesis = ledger.all_entries().unwrap().get(0).unwrap().clone();
        let genesis_frame = encode_frame(&serde_json::to_vec(genesis.as_ref()).unwrap())
            .unwrap()
            .len();
        drop(ledger);
        let len_before = std::fs::metadata(&path).unwrap().len();

        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(genesis_frame as u64)).unwrap();
            file.write_all(&u32::MAX.to_le_bytes()).unwrap();
        }

        let err = Ledger::open(&path, SyncMode::default()).err().unwrap();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 1, .. }));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn from_entries_rejects_empty_history() {
        let err = Ledger::from_entries(vec![], EntryHasher::ENTRY).err().unwrap();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 0, .. }));
    }

    proptest! {
        #[test]
        fn any_append_sequence_links_and_validates(
            subjects in proptest::collection::vec("[a-z]{1,6}", 1..24)
        ) {
            let ledger = Ledger::new().unwrap();
            for subject in &subjects {
                ledger.append(event(subject, "SUBMITTED", "PENDING")).unwrap();
            }

            let entries = ledger.all_entries().unwrap();
            prop_assert_eq!(entries.len(), subjects.len() + 1);
            let verifier = HashChainVerifier::new(EntryHasher::ENTRY, GENESIS_PREVIOUS_DIGEST);
            for sequence in 1..entries.len() as u64 {
                let prev = entries.get(sequence - 1).unwrap();
                let current = entries.get(sequence).unwrap();
                prop_assert_eq!(verifier.compute_digest(prev.as_ref()).unwrap(), current.previous_digest());
            }
            prop_assert!(ledger.validate().is_ok());
        }
    }

    #[test]
    fn ledger_built_with_other_hasher_fails_validation() {
        let ledger = Ledger::with_hasher(EntryHasher::new("kyc-entry-v0")).unwrap();
        ledger.append(event("A", "SUBMITTED", "PENDING")).unwrap();
        let entries: Vec<Entry> = ledger
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| (*e).clone())
            .collect();

        let err = Ledger::from_entries(entries, EntryHasher::ENTRY).err().unwrap();
        assert!(matches!(err, LedgerError::ChainIntegrity { sequence: 0, .. }));
    }
}
