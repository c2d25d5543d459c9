//! # Transaction Ledger
//!
//! **Immutable, Append-Only, Crash-Safe**
//!
//! Every ruby movement is recorded here: pack purchases, market purchases,
//! market sales. Entries are never mutated or deleted; they exist for audit
//! and reconciliation.
//!
//! ## File Format
//!
//! ```text
//! [4 bytes: magic "TKLG"]
//! [4 bytes: version]
//!
//! Record format:
//! [4 bytes: payload length]
//! [N bytes: payload (serialized entry)]
//! [4 bytes: CRC32 of payload]
//! ```
//!
//! On reopen the file is scanned front to back; the first torn or corrupt
//! record truncates the tail. A batch of entries is framed into one buffer
//! and written with a single `write_all` + `sync_data`, so a unit of work
//! that appends several entries commits them together or not at all.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{EconomyError, EconomyResult};
use crate::store::AccountId;

/// Magic bytes identifying a ledger file.
const LEDGER_MAGIC: &[u8; 4] = b"TKLG";

/// Current ledger format version.
const LEDGER_VERSION: u32 = 1;

/// Unique identifier for a ledger entry.
pub type EntryId = u64;

/// Classification of a currency movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// Rubies spent opening a pack.
    PackPurchase = 0,
    /// Rubies spent buying a marketplace listing.
    MarketPurchase = 1,
    /// Rubies received from a marketplace sale.
    MarketSale = 2,
}

impl EntryKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PackPurchase),
            1 => Some(Self::MarketPurchase),
            2 => Some(Self::MarketSale),
            _ => None,
        }
    }
}

/// An immutable ledger entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Unique, monotonically increasing identifier.
    pub id: EntryId,
    /// Account whose balance changed.
    pub account: AccountId,
    /// Signed ruby delta (negative = debit).
    pub amount: i64,
    /// Movement classification.
    pub kind: EntryKind,
    /// Free-text description for audit display.
    pub description: String,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// A not-yet-committed entry; the ledger assigns ID and timestamp.
#[derive(Clone, Debug)]
pub struct EntryDraft {
    /// Account whose balance changes.
    pub account: AccountId,
    /// Signed ruby delta.
    pub amount: i64,
    /// Movement classification.
    pub kind: EntryKind,
    /// Free-text description.
    pub description: String,
}

/// Current unix time in milliseconds.
pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// The append-only transaction ledger.
///
/// Keeps an in-memory mirror of all entries for queries; optionally backed
/// by a crash-safe file.
pub struct Ledger {
    file: Option<File>,
    path: Option<PathBuf>,
    entries: Vec<LedgerEntry>,
    next_id: EntryId,
}

impl Ledger {
    /// Opens (or creates) a file-backed ledger, recovering existing entries.
    ///
    /// A torn tail from a crash mid-append is truncated; everything before
    /// it is recovered.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` errors for I/O failures or a foreign file header.
    pub fn open(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(EconomyError::ledger(&err)),
        };

        let (entries, valid_len) = if bytes.is_empty() {
            (Vec::new(), 0)
        } else {
            Self::recover(&bytes)?
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| EconomyError::ledger(&e))?;

        if bytes.is_empty() {
            let mut header = Vec::with_capacity(8);
            header.extend_from_slice(LEDGER_MAGIC);
            header.extend_from_slice(&LEDGER_VERSION.to_le_bytes());
            file.write_all(&header)
                .map_err(|e| EconomyError::ledger(&e))?;
            file.sync_data().map_err(|e| EconomyError::ledger(&e))?;
        } else if valid_len < bytes.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                dropped = bytes.len() as u64 - valid_len,
                "truncating torn ledger tail"
            );
            file.set_len(valid_len).map_err(|e| EconomyError::ledger(&e))?;
            file.sync_data().map_err(|e| EconomyError::ledger(&e))?;
        }

        // Position at the end for appends.
        file.seek(SeekFrom::End(0))
            .map_err(|e| EconomyError::ledger(&e))?;

        let next_id = entries.last().map_or(0, |e| e.id + 1);
        Ok(Self {
            file: Some(file),
            path: Some(path),
            entries,
            next_id,
        })
    }

    /// Creates a memory-only ledger (tests, embedding).
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            file: None,
            path: None,
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends a batch of entries as one commit.
    ///
    /// Either every draft in the batch becomes visible (in memory and, for
    /// file-backed ledgers, durable on disk) or none does. IDs and
    /// timestamps are assigned here.
    ///
    /// # Errors
    ///
    /// Returns `Ledger` on I/O failure; the in-memory mirror is untouched.
    pub fn append_batch(&mut self, drafts: Vec<EntryDraft>) -> EconomyResult<()> {
        let now = unix_now_ms();
        let mut staged = Vec::with_capacity(drafts.len());
        let mut buf = Vec::new();

        for (offset, draft) in drafts.into_iter().enumerate() {
            let entry = LedgerEntry {
                id: self.next_id + offset as u64,
                account: draft.account,
                amount: draft.amount,
                kind: draft.kind,
                description: draft.description,
                timestamp_ms: now,
            };
            encode_record(&entry, &mut buf);
            staged.push(entry);
        }

        if let Some(file) = self.file.as_mut() {
            file.write_all(&buf).map_err(|e| EconomyError::ledger(&e))?;
            file.sync_data().map_err(|e| EconomyError::ledger(&e))?;
        }

        self.next_id += staged.len() as u64;
        self.entries.extend(staged);
        Ok(())
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// All entries touching one account, oldest first.
    #[must_use]
    pub fn entries_for(&self, account: AccountId) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.account == account)
            .cloned()
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scans raw file bytes; returns recovered entries and the byte length
    /// of the valid prefix.
    fn recover(bytes: &[u8]) -> EconomyResult<(Vec<LedgerEntry>, u64)> {
        if bytes.len() < 8 || &bytes[0..4] != LEDGER_MAGIC {
            return Err(EconomyError::Ledger {
                reason: "not a ledger file (bad magic)".to_string(),
            });
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != LEDGER_VERSION {
            return Err(EconomyError::Ledger {
                reason: format!("unsupported ledger version {version}"),
            });
        }

        let mut entries = Vec::new();
        let mut pos = 8usize;
        loop {
            let Some(len_bytes) = bytes.get(pos..pos + 4) else {
                break;
            };
            let payload_len = u32::from_le_bytes(len_bytes.try_into().unwrap_or([0; 4])) as usize;
            let payload_start = pos + 4;
            let crc_start = payload_start + payload_len;
            let record_end = crc_start + 4;
            let (Some(payload), Some(crc_bytes)) = (
                bytes.get(payload_start..crc_start),
                bytes.get(crc_start..record_end),
            ) else {
                break; // torn tail
            };

            let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap_or([0; 4]));
            if crc32fast::hash(payload) != stored_crc {
                break; // corrupt record, stop here
            }
            let Some(entry) = decode_payload(payload) else {
                break;
            };
            entries.push(entry);
            pos = record_end;
        }

        Ok((entries, pos as u64))
    }
}

/// Frames one entry into the output buffer: length, payload, CRC32.
fn encode_record(entry: &LedgerEntry, buf: &mut Vec<u8>) {
    let mut payload = Vec::with_capacity(37 + entry.description.len());
    payload.extend_from_slice(&entry.id.to_le_bytes());
    payload.extend_from_slice(&entry.account.to_le_bytes());
    payload.extend_from_slice(&entry.amount.to_le_bytes());
    payload.push(entry.kind as u8);
    payload.extend_from_slice(&entry.timestamp_ms.to_le_bytes());
    let desc = entry.description.as_bytes();
    payload.extend_from_slice(&(desc.len() as u32).to_le_bytes());
    payload.extend_from_slice(desc);

    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
}

/// Byte cursor over one record payload.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(slice)
    }

    fn take_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }
}

/// Decodes one record payload; `None` marks it corrupt.
fn decode_payload(payload: &[u8]) -> Option<LedgerEntry> {
    let mut cursor = Cursor {
        bytes: payload,
        pos: 0,
    };

    let id = cursor.take_u64()?;
    let account = cursor.take_u64()?;
    let amount = i64::from_le_bytes(cursor.take(8)?.try_into().ok()?);
    let kind = EntryKind::from_u8(cursor.take(1)?[0])?;
    let timestamp_ms = cursor.take_u64()?;
    let desc_len = u32::from_le_bytes(cursor.take(4)?.try_into().ok()?) as usize;
    let description = String::from_utf8(cursor.take(desc_len)?.to_vec()).ok()?;

    if cursor.pos != payload.len() {
        return None;
    }

    Some(LedgerEntry {
        id,
        account,
        amount,
        kind,
        description,
        timestamp_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger_path() -> PathBuf {
        let id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_ledger_{id}.tklg"))
    }

    fn draft(account: AccountId, amount: i64) -> EntryDraft {
        EntryDraft {
            account,
            amount,
            kind: if amount < 0 {
                EntryKind::MarketPurchase
            } else {
                EntryKind::MarketSale
            },
            description: format!("test movement of {amount}"),
        }
    }

    #[test]
    fn test_ephemeral_append_and_query() {
        let mut ledger = Ledger::ephemeral();
        ledger
            .append_batch(vec![draft(1, -500), draft(2, 500)])
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[0].id, 0);
        assert_eq!(ledger.entries()[1].id, 1);
        assert_eq!(ledger.entries_for(1).len(), 1);
        assert_eq!(ledger.entries_for(1)[0].amount, -500);
    }

    #[test]
    fn test_reopen_recovers_entries() {
        let path = temp_ledger_path();
        {
            let mut ledger = Ledger::open(&path).unwrap();
            ledger.append_batch(vec![draft(7, -100)]).unwrap();
            ledger
                .append_batch(vec![draft(7, -200), draft(9, 200)])
                .unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.entries()[2].account, 9);
        assert_eq!(ledger.entries()[2].amount, 200);

        // New appends continue the ID sequence.
        let mut ledger = ledger;
        ledger.append_batch(vec![draft(7, -50)]).unwrap();
        assert_eq!(ledger.entries()[3].id, 3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let path = temp_ledger_path();
        {
            let mut ledger = Ledger::open(&path).unwrap();
            ledger.append_batch(vec![draft(1, -100)]).unwrap();
            ledger.append_batch(vec![draft(1, -200)]).unwrap();
        }

        // Simulate a crash mid-append: chop bytes off the last record.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].amount, -100);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_record_stops_recovery() {
        let path = temp_ledger_path();
        {
            let mut ledger = Ledger::open(&path).unwrap();
            ledger.append_batch(vec![draft(1, -100)]).unwrap();
            ledger.append_batch(vec![draft(1, -200)]).unwrap();
        }

        // Flip a byte inside the second record's payload.
        let mut bytes = std::fs::read(&path).unwrap();
        let len = bytes.len();
        bytes[len - 10] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.len(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_foreign_file_rejected() {
        let path = temp_ledger_path();
        std::fs::write(&path, b"definitely not a ledger").unwrap();

        assert!(matches!(
            Ledger::open(&path),
            Err(EconomyError::Ledger { .. })
        ));

        std::fs::remove_file(&path).ok();
    }
}
