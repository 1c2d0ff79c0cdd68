use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::{LedgerError, LedgerResult};

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Largest payload a frame may carry. Entries are small JSON objects, so a
/// header declaring more than this is corruption, not a torn write.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug)]
struct JournalWriter {
    writer: BufWriter<File>,
    /// Byte length of the well-formed prefix of the file.
    offset: u64,
}

/// Entries recovered from a journal file.
#[derive(Debug)]
pub struct Recovery {
    pub entries: Vec<Entry>,
    /// Length of the intact prefix of the file.
    pub valid_len: u64,
    /// A partially written final frame was found past `valid_len`.
    pub torn_tail: bool,
}

/// Append-only on-disk encoding of ledger entries.
///
/// On-disk format, one frame per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON-encoded Entry)]
/// ```
///
/// A frame cut short at the end of the file is a torn write and is dropped,
/// provided nothing after it still parses as a complete frame. A complete
/// frame whose CRC does not match, an oversized length header, or a short
/// frame followed by intact frames is corruption and fails the whole
/// recovery, since skipping it would open a gap in the chain.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) a journal file at the given path.
    pub fn open(path: &Path, sync_mode: SyncMode) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync_mode,
        })
    }

    /// Append one entry. Returns the byte offset of its frame.
    ///
    /// On a failed write the file is cut back to its previous length, so a
    /// rejected append leaves no trace.
    pub fn append(&self, entry: &Entry) -> LedgerResult<u64> {
        let payload =
            serde_json::to_vec(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let frame = encode_frame(&payload)?;

        let mut w = self.writer.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let entry_offset = w.offset;

        if let Err(e) = write_frame(&mut w.writer, &frame, self.sync_mode) {
            warn!(offset = entry_offset, error = %e, "journal append failed; rolling back");
            let fresh = self.reopen_truncated(entry_offset)?;
            discard_writer(&mut w, fresh);
            return Err(e.into());
        }

        w.offset += frame.len() as u64;
        debug!(
            sequence = entry.sequence(),
            offset = entry_offset,
            len = payload.len(),
            "journal append"
        );
        Ok(entry_offset)
    }

    /// Read every intact entry from the start of the journal.
    pub fn recover(&self) -> LedgerResult<Recovery> {
        read_frames(&self.path)
    }

    /// Drop everything past `len` bytes, e.g. a torn tail found on recovery.
    pub fn truncate_to(&self, len: u64) -> LedgerResult<()> {
        let mut w = self.writer.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let fresh = self.reopen_truncated(len)?;
        discard_writer(&mut w, fresh);
        w.offset = len;
        debug!(len, "journal truncated");
        Ok(())
    }

    /// Current write offset.
    pub fn offset(&self) -> LedgerResult<u64> {
        Ok(self
            .writer
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read entries from a journal without opening it for writing.
    pub fn read_entries(path: &Path) -> LedgerResult<Vec<Entry>> {
        let recovery = read_frames(path)?;
        if recovery.torn_tail {
            warn!(path = %path.display(), "journal has a torn tail; ignoring it");
        }
        Ok(recovery.entries)
    }

    fn reopen_truncated(&self, len: u64) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        file.set_len(len)?;
        Ok(BufWriter::new(file))
    }
}

/// Frame a payload as `[len][crc][payload]`.
pub(crate) fn encode_frame(payload: &[u8]) -> LedgerResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(LedgerError::Serialization(format!(
            "entry is {} bytes, journal frames hold at most {MAX_FRAME_LEN}",
            payload.len()
        )));
    }
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Swap in a new writer without flushing the old one's buffer.
fn discard_writer(w: &mut JournalWriter, fresh: BufWriter<File>) {
    let stale = std::mem::replace(&mut w.writer, fresh);
    let _ = stale.into_parts();
}

fn write_frame(writer: &mut BufWriter<File>, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

fn read_frames(path: &Path) -> LedgerResult<Recovery> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

    let file_len = bytes.len();
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut torn_tail = false;

    while offset < file_len {
        if offset + HEADER_SIZE > file_len {
            torn_tail = true;
            break;
        }

        let header = &bytes[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + HEADER_SIZE;
        let position = entries.len() as u64;
        if length > MAX_FRAME_LEN {
            return Err(LedgerError::ChainIntegrity {
                sequence: position,
                reason: format!(
                    "journal frame at offset {offset} declares {length} bytes, over the {MAX_FRAME_LEN} byte limit"
                ),
            });
        }
        if start + length > file_len {
            if let Some(later) = find_complete_frame(&bytes, start) {
                return Err(LedgerError::ChainIntegrity {
                    sequence: position,
                    reason: format!(
                        "journal frame at offset {offset} overruns the file but an intact frame follows at offset {later}"
                    ),
                });
            }
            torn_tail = true;
            break;
        }

        let payload = &bytes[start..start + length];

        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(LedgerError::ChainIntegrity {
                sequence: position,
                reason: format!(
                    "journal frame at offset {offset} failed CRC check: expected {expected_crc:#010x}, got {actual_crc:#010x}"
                ),
            });
        }

        let entry: Entry =
            serde_json::from_slice(payload).map_err(|e| LedgerError::ChainIntegrity {
                sequence: position,
                reason: format!("journal frame at offset {offset} is not a valid entry: {e}"),
            })?;
        entries.push(entry);
        offset = start + length;
    }

    if torn_tail {
        warn!(
            offset,
            file_len,
            "truncated journal frame; dropping torn tail"
        );
    }
    debug!(recovered = entries.len(), "journal recovery complete");

    Ok(Recovery {
        entries,
        valid_len: offset as u64,
        torn_tail,
    })
}

/// Offset of the first intact frame at or after `from`, if any.
///
/// A torn write is always the last thing in the file, so finding one means
/// the short frame before it was damaged in place.
fn find_complete_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..)
        .take_while(|&at| at + HEADER_SIZE <= bytes.len())
        .find(|&at| {
            let header = &bytes[at..at + HEADER_SIZE];
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let start = at + HEADER_SIZE;
            if length < 2 || length > MAX_FRAME_LEN || start + length > bytes.len() {
                return false;
            }
            let payload = &bytes[start..start + length];
            payload[0] == b'{' && payload[length - 1] == b'}' && crc32fast::hash(payload) == crc
        })
}
