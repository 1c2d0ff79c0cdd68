use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use kyc_crypto::{canonical_bytes, ChainLinked, EntryHasher, HasherError};
use kyc_types::{Digest, EventKind, SubjectId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::payload::{Payload, EVENT};

/// Previous digest recorded by every genesis entry (32 zero bytes).
pub const GENESIS_PREVIOUS_DIGEST: Digest = Digest::ZERO;

/// Timestamp recorded by every genesis entry, so that independently built
/// ledgers share an identical genesis digest.
pub fn genesis_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// One immutable, hash-linked ledger record.
///
/// Fields are only readable from outside the crate. Entries are built by
/// [`Entry::seal`], which computes the digest over the canonical encoding of
/// `{sequence, timestamp, payload, previous_digest}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub(crate) sequence: u64,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) payload: Payload,
    pub(crate) previous_digest: Digest,
    pub(crate) digest: Digest,
}

/// The hashed portion of an entry.
#[derive(Serialize)]
struct EntryHeader<'a> {
    sequence: u64,
    timestamp: String,
    payload: &'a Payload,
    previous_digest: Digest,
}

impl Entry {
    /// Build an entry and compute its digest.
    ///
    /// Timestamps are truncated to microseconds so the value survives a
    /// round trip through the journal unchanged.
    pub(crate) fn seal(
        sequence: u64,
        timestamp: DateTime<Utc>,
        payload: Payload,
        previous_digest: Digest,
        hasher: EntryHasher,
    ) -> Result<Self, LedgerError> {
        let mut entry = Self {
            sequence,
            timestamp: timestamp.trunc_subsecs(6),
            payload,
            previous_digest,
            digest: Digest::ZERO,
        };
        entry.digest = hasher.hash(&entry.header_bytes()?);
        Ok(entry)
    }

    /// The fixed first entry of every ledger.
    pub fn genesis(hasher: EntryHasher) -> Result<Self, LedgerError> {
        Self::seal(
            0,
            genesis_timestamp(),
            Payload::new().with(EVENT, EventKind::Genesis.as_str()),
            GENESIS_PREVIOUS_DIGEST,
            hasher,
        )
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture time of the append. Advisory only.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn previous_digest(&self) -> Digest {
        self.previous_digest
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence == 0
    }

    /// Whether the payload names `subject`.
    pub fn mentions(&self, subject: &SubjectId) -> bool {
        self.payload.subject_id() == Some(subject.as_str())
    }

    /// Parsed `event` discriminator.
    pub fn event_kind(&self) -> Result<EventKind, LedgerError> {
        let raw = self.payload.event().ok_or_else(|| LedgerError::MalformedEntry {
            sequence: self.sequence,
            reason: "missing event".into(),
        })?;
        raw.parse().map_err(|_| LedgerError::MalformedEntry {
            sequence: self.sequence,
            reason: format!("unknown event {raw:?}"),
        })
    }

    /// Check the fields every applicant event must carry.
    ///
    /// Genesis is exempt. Applicant events need a textual `subjectId` and a
    /// `SUBMITTED` or `DECIDED` event.
    pub fn check_well_formed(&self) -> Result<(), LedgerError> {
        if self.is_genesis() {
            return Ok(());
        }
        if self.payload.subject_id().is_none() {
            return Err(LedgerError::MalformedEntry {
                sequence: self.sequence,
                reason: "missing subjectId".into(),
            });
        }
        match self.event_kind()? {
            EventKind::Submitted | EventKind::Decided => Ok(()),
            EventKind::Genesis => Err(LedgerError::MalformedEntry {
                sequence: self.sequence,
                reason: "genesis event after sequence 0".into(),
            }),
        }
    }
}

impl ChainLinked for Entry {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn digest(&self) -> Digest {
        self.digest
    }

    fn previous_digest(&self) -> Digest {
        self.previous_digest
    }

    fn header_bytes(&self) -> Result<Vec<u8>, HasherError> {
        canonical_bytes(&EntryHeader {
            sequence: self.sequence,
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            payload: &self.payload,
            previous_digest: self.previous_digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::payload::{STATUS, SUBJECT_ID};

    fn submitted(subject: &str) -> Payload {
        Payload::new()
            .with(SUBJECT_ID, subject)
            .with(EVENT, "SUBMITTED")
            .with(STATUS, "PENDING")
    }

    #[test]
    fn genesis_is_fixed() {
        let a = Entry::genesis(EntryHasher::ENTRY).unwrap();
        let b = Entry::genesis(EntryHasher::ENTRY).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sequence(), 0);
        assert_eq!(a.previous_digest(), GENESIS_PREVIOUS_DIGEST);
        assert_eq!(a.event_kind().unwrap(), EventKind::Genesis);
    }

    #[test]
    fn digest_covers_every_field() {
        let ts = Utc::now();
        let base = Entry::seal(1, ts, submitted("A"), Digest::ZERO, EntryHasher::ENTRY).unwrap();

        let other_seq = Entry::seal(2, ts, submitted("A"), Digest::ZERO, EntryHasher::ENTRY).unwrap();
        let other_payload =
            Entry::seal(1, ts, submitted("B"), Digest::ZERO, EntryHasher::ENTRY).unwrap();
        let other_prev = Entry::seal(
            1,
            ts,
            submitted("A"),
            Digest::from_hash([1; 32]),
            EntryHasher::ENTRY,
        )
        .unwrap();
        let other_ts = Entry::seal(
            1,
            ts + chrono::Duration::seconds(1),
            submitted("A"),
            Digest::ZERO,
            EntryHasher::ENTRY,
        )
        .unwrap();

        for other in [other_seq, other_payload, other_prev, other_ts] {
            assert_ne!(base.digest(), other.digest());
        }
    }

    #[test]
    fn digest_is_independent_of_payload_construction_order() {
        let ts = Utc::now();
        let forward = Payload::new()
            .with(SUBJECT_ID, "A")
            .with(EVENT, "DECIDED")
            .with(STATUS, "VERIFIED");
        let backward = Payload::new()
            .with(STATUS, "VERIFIED")
            .with(EVENT, "DECIDED")
            .with(SUBJECT_ID, "A");
        let prev = Digest::from_hash([5; 32]);

        let a = Entry::seal(3, ts, forward, prev, EntryHasher::ENTRY).unwrap();
        let b = Entry::seal(3, ts, backward, prev, EntryHasher::ENTRY).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    proptest! {
        #[test]
        fn digest_ignores_insertion_order(
            pairs in proptest::collection::btree_map("[a-zA-Z]{1,8}", "[ -~]{0,12}", 0..10)
        ) {
            let ts = Utc::now();
            let forward: Payload = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let mut backward = Payload::new();
            for (k, v) in pairs.iter().rev() {
                backward.insert(k.as_str(), v.as_str());
            }
            let prev = Digest::from_hash([9; 32]);
            let a = Entry::seal(7, ts, forward, prev, EntryHasher::ENTRY).unwrap();
            let b = Entry::seal(7, ts, backward, prev, EntryHasher::ENTRY).unwrap();
            prop_assert_eq!(a.digest(), b.digest());
        }
    }

    #[test]
    fn journal_roundtrip_preserves_digest() {
        let entry =
            Entry::seal(1, Utc::now(), submitted("A"), Digest::ZERO, EntryHasher::ENTRY).unwrap();
        let json = serde_json::to_vec(&entry).unwrap();
        let parsed: Entry = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(
            EntryHasher::ENTRY.hash(&parsed.header_bytes().unwrap()),
            entry.digest()
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        let no_subject = Entry::seal(
            4,
            Utc::now(),
            Payload::new().with(EVENT, "SUBMITTED"),
            Digest::ZERO,
            EntryHasher::ENTRY,
        )
        .unwrap();
        assert!(matches!(
            no_subject.check_well_formed(),
            Err(LedgerError::MalformedEntry { sequence: 4, .. })
        ));

        let no_event = Entry::seal(
            5,
            Utc::now(),
            Payload::new().with(SUBJECT_ID, "A"),
            Digest::ZERO,
            EntryHasher::ENTRY,
        )
        .unwrap();
        assert_eq!(
            no_event.check_well_formed().unwrap_err(),
            LedgerError::MalformedEntry {
                sequence: 5,
                reason: "missing event".into()
            }
        );
    }

    #[test]
    fn mentions_matches_subject() {
        let entry =
            Entry::seal(1, Utc::now(), submitted("A"), Digest::ZERO, EntryHasher::ENTRY).unwrap();
        assert!(entry.mentions(&SubjectId::new("A").unwrap()));
        assert!(!entry.mentions(&SubjectId::new("B").unwrap()));
    }
}
