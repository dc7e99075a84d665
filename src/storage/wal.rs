use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::core::config::{Config, SyncMode};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;
use crate::transaction::log::{recoverable, LogEntry, TransactionLog};
use crate::transaction::request::DurableTransaction;

const FLAG_COMPRESSED: u8 = 1;
const HEADER_LEN: usize = 9;                 // len u32 + crc u32 + flags u8
const MAX_ENTRY_LEN: usize = 256 * 1024 * 1024;
const BATCH_SYNC_BYTES: u64 = 1024 * 1024;

/// One decoded frame of the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub entry: LogEntry,
}

struct WalFile {
    file: File,
    sequence: u64,
    unsynced: u64,
}

/// Append-only, checksummed transaction log on disk.
///
/// Frame: `len: u32 LE | crc32(body): u32 LE | flags: u8 | body`, where body is the bincode
/// record, lz4-compressed when larger than the configured threshold.
pub struct WalTransactionLog {
    layout: StorageLayout,
    path: PathBuf,
    sync_mode: SyncMode,
    compression_threshold: usize,
    inner: Mutex<WalFile>,
}

impl WalTransactionLog {
    pub fn open(layout: &StorageLayout, config: &Config) -> Result<Self> {
        let path = layout.transaction_log_path();
        let sequence = if path.exists() {
            let (records, valid_len) = decode_file(&path)?;
            let file = OpenOptions::new().write(true).open(&path)?;
            if file.metadata()?.len() > valid_len {
                // new frames start right after the last complete one
                tracing::warn!(path = %path.display(), valid_len, "truncating torn transaction log tail");
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            records.last().map_or(0, |record| record.sequence + 1)
        } else {
            0
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(WalTransactionLog {
            layout: layout.clone(),
            path,
            sync_mode: config.wal_sync_mode,
            compression_threshold: config.wal_compression_threshold,
            inner: Mutex::new(WalFile { file, sequence, unsynced: 0 }),
        })
    }

    fn append(&self, entry: LogEntry) -> Result<()> {
        let mut wal = self.inner.lock();
        let record = WalRecord { sequence: wal.sequence, timestamp: Utc::now(), entry };

        let mut body = bincode::serialize(&record)?;
        let mut flags = 0;
        if body.len() > self.compression_threshold {
            body = lz4_flex::compress_prepend_size(&body);
            flags |= FLAG_COMPRESSED;
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        frame.push(flags);
        frame.extend_from_slice(&body);
        wal.file.write_all(&frame)?;

        wal.sequence += 1;
        wal.unsynced += frame.len() as u64;

        // Sync based on mode
        match self.sync_mode {
            SyncMode::Immediate => wal.file.sync_data()?,
            SyncMode::Batch if wal.unsynced >= BATCH_SYNC_BYTES => wal.file.sync_data()?,
            _ => return Ok(()),
        }
        wal.unsynced = 0;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        let mut wal = self.inner.lock();
        wal.file.sync_all()?;
        wal.unsynced = 0;
        Ok(())
    }

    /// Every record with its sequence number and write time
    pub fn read_records(&self) -> Result<Vec<WalRecord>> {
        let _guard = self.inner.lock();
        Ok(decode_file(&self.path)?.0)
    }

    /// Every entry in log order
    pub fn read_entries(&self) -> Result<Vec<LogEntry>> {
        Ok(self.read_records()?.into_iter().map(|r| r.entry).collect())
    }

    /// Committed records and staged records never cancelled: the input of crash recovery
    pub fn recoverable_transactions(&self) -> Result<Vec<DurableTransaction>> {
        Ok(recoverable(&self.read_entries()?))
    }

    /// Move the current log aside once its content has been replayed and start an empty one
    pub fn rotate(&self) -> Result<PathBuf> {
        let mut wal = self.inner.lock();
        wal.file.sync_all()?;

        let archived = self.layout.archived_log_path(self.archived_sequences()?.last().map_or(0, |s| s + 1));
        fs::rename(&self.path, &archived)?;
        wal.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        wal.sequence = 0;
        wal.unsynced = 0;

        tracing::info!(archived = %archived.display(), "transaction log rotated");
        Ok(archived)
    }

    /// Sequence numbers of the archived logs, sorted
    pub fn archived_sequences(&self) -> Result<Vec<u64>> {
        let mut sequences = Vec::new();
        for entry in fs::read_dir(self.layout.wal_dir())? {
            let path = entry?.path();
            let sequence = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.strip_prefix("transactions_"))
                .and_then(|digits| digits.parse::<u64>().ok());
            if let Some(sequence) = sequence {
                sequences.push(sequence);
            }
        }
        sequences.sort_unstable();
        Ok(sequences)
    }
}

impl TransactionLog for WalTransactionLog {
    fn new_transaction(&self, record: &DurableTransaction, two_stage: bool) -> Result<()> {
        let entry = if two_stage {
            LogEntry::Delayed(record.clone())
        } else {
            LogEntry::Committed(record.clone())
        };
        self.append(entry)
    }

    fn cancel_delayed_transaction(&self, transaction_id: Uuid) -> Result<()> {
        self.append(LogEntry::Cancelled(transaction_id))
    }
}

/// Decode every complete frame and return them with the byte length they span.
/// A torn frame at the tail ends the log; a bad checksum is corruption.
fn decode_file(path: &Path) -> Result<(Vec<WalRecord>, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut header = [0u8; HEADER_LEN];
        match read_full(&mut reader, &mut header)? {
            0 => break,
            n if n < HEADER_LEN => {
                tracing::warn!(path = %path.display(), records = records.len(), "truncated transaction log header");
                break;
            }
            _ => {}
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let flags = header[8];
        if len > MAX_ENTRY_LEN {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("Transaction log entry of {} bytes, possibly corrupted", len),
            ));
        }

        let mut body = vec![0u8; len];
        if read_full(&mut reader, &mut body)? < len {
            tracing::warn!(path = %path.display(), records = records.len(), "truncated transaction log entry");
            break;
        }
        if crc32fast::hash(&body) != crc {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("Checksum mismatch in transaction log after {} records", records.len()),
            ));
        }

        if flags & FLAG_COMPRESSED != 0 {
            body = lz4_flex::decompress_size_prepended(&body)
                .map_err(|e| Error::new(ErrorKind::Parse, format!("Bad compressed log entry: {}", e)))?;
        }
        records.push(bincode::deserialize::<WalRecord>(&body)?);
        valid_len += (HEADER_LEN + len) as u64;
    }
    Ok((records, valid_len))
}

/// Like `read_exact` but reports how much was read before end of file
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
