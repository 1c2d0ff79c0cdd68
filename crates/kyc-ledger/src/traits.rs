use std::sync::Arc;

use kyc_crypto::EntryHasher;
use kyc_types::SubjectId;

use crate::entry::Entry;
use crate::error::LedgerError;
use crate::ledger::Entries;
use crate::payload::Payload;

/// Write boundary of the ledger. `append` is the only mutating operation.
pub trait LedgerWriter: Send + Sync {
    /// Seal `payload` into the next entry and publish it.
    ///
    /// The ledger assigns the sequence number and both digests. The returned
    /// entry lets callers audit the write.
    fn append(&self, payload: Payload) -> Result<Arc<Entry>, LedgerError>;
}

/// Read boundary of the ledger.
pub trait LedgerReader: Send + Sync {
    /// Snapshot of every entry in ascending sequence order.
    fn all_entries(&self) -> Result<Entries, LedgerError>;

    /// The hasher every entry of this ledger was sealed with.
    fn hasher(&self) -> EntryHasher;

    /// Entries whose payload names `subject`, in ascending sequence order.
    fn entries_for_subject(&self, subject: &SubjectId) -> Result<Vec<Arc<Entry>>, LedgerError> {
        Ok(self
            .all_entries()?
            .into_iter()
            .filter(|entry| entry.mentions(subject))
            .collect())
    }

    /// The most recently appended entry.
    fn head(&self) -> Result<Arc<Entry>, LedgerError> {
        self.all_entries()?
            .last()
            .cloned()
            .ok_or_else(|| LedgerError::ChainIntegrity {
                sequence: 0,
                reason: "ledger has no genesis entry".into(),
            })
    }
}
