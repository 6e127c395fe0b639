//! Append-only journal of record writes.
//!
//! Every committed write to the store is framed as
//! `u32 len | msgpack entry | u32 crc32` after a short file header. The
//! journal is replayed in order on open to rebuild the in-memory records.

use crate::error::{AttendanceError, Result};
use crate::types::{Community, Person, PersonId, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Magic bytes for the journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"ATT\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

const HEADER_SIZE: u64 = 5;

/// Largest encoded entry. Larger writes are refused; larger frames on
/// disk are treated as corruption.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// A write recorded in the journal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JournalOp {
    PutCommunity(Community),
    PutPerson(Person),
    RemovePerson(PersonId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub op: JournalOp,
}

/// Destination for journal frames that can be cut back to a known length.
trait FrameSink: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn rollback(&mut self, len: u64) -> io::Result<()>;
}

impl FrameSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn rollback(&mut self, len: u64) -> io::Result<()> {
        // Append mode: the next write lands at the new end of file.
        self.set_len(len)
    }
}

struct JournalWriter<S = File> {
    sink: S,
    /// File length covering only fully written frames.
    committed_len: u64,
    next_seq: u64,
    writes_since_sync: u64,
    /// Set when a failed frame could not be rolled back.
    failed: bool,
}

impl<S: FrameSink> JournalWriter<S> {
    /// Write one complete frame, or leave the sink at `committed_len`.
    fn commit(&mut self, frame: &[u8], sync: bool) -> Result<()> {
        if self.failed {
            return Err(AttendanceError::Io(io::Error::new(
                io::ErrorKind::Other,
                "journal is unusable after a failed rollback",
            )));
        }

        let written = self
            .sink
            .write_all(frame)
            .and_then(|_| self.sink.flush())
            .and_then(|_| if sync { self.sink.sync() } else { Ok(()) });
        if let Err(err) = written {
            if let Err(rollback) = self.sink.rollback(self.committed_len) {
                error!(
                    committed_len = self.committed_len,
                    error = %rollback,
                    "journal rollback failed, refusing further appends"
                );
                self.failed = true;
            } else {
                warn!(committed_len = self.committed_len, error = %err, "journal write rolled back");
            }
            return Err(err.into());
        }

        self.committed_len += frame.len() as u64;
        Ok(())
    }
}

enum Frame {
    Entry(JournalEntry, u64),
    End,
    Torn,
}

/// Durable, append-only journal.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    /// Sync every N writes.
    sync_interval: u64,
}

impl Journal {
    /// Default sync interval, matching a balance of durability and throughput.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a journal, returning the entries to replay.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            Self::replay(&path)?
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.write_all(JOURNAL_MAGIC)?;
            file.write_all(&[JOURNAL_VERSION])?;
            file.sync_all()?;
            Vec::new()
        };

        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);
        let file = OpenOptions::new().append(true).open(&path)?;
        let committed_len = file.metadata()?.len();

        let journal = Self {
            path,
            writer: Mutex::new(JournalWriter {
                sink: file,
                committed_len,
                next_seq,
                writes_since_sync: 0,
                failed: false,
            }),
            sync_interval: sync_interval.max(1),
        };

        Ok((journal, entries))
    }

    /// Append an operation. Returns its sequence number once it is flushed.
    ///
    /// On error nothing of the entry remains in the journal.
    pub fn append(&self, op: JournalOp) -> Result<u64> {
        let mut writer = self.writer.lock();
        let seq = writer.next_seq;

        let entry = JournalEntry {
            seq,
            timestamp: Timestamp::now(),
            op,
        };
        let frame = Self::encode_frame(&entry)?;
        let sync = writer.writes_since_sync + 1 >= self.sync_interval;
        writer.commit(&frame, sync)?;

        writer.next_seq += 1;
        writer.writes_since_sync = if sync { 0 } else { writer.writes_since_sync + 1 };
        Ok(seq)
    }

    /// Force all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.sink.sync_all()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path) -> Result<Vec<JournalEntry>> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(AttendanceError::InvalidFormat("Invalid journal magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != JOURNAL_VERSION {
            return Err(AttendanceError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                version[0]
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;

        loop {
            match Self::read_frame(&mut reader, file_len - offset)? {
                Frame::Entry(entry, frame_len) => {
                    offset += frame_len;
                    entries.push(entry);
                }
                Frame::End => break,
                Frame::Torn => {
                    warn!(
                        path = %path.display(),
                        valid_bytes = offset,
                        file_bytes = file_len,
                        "truncating torn journal tail"
                    );
                    OpenOptions::new().write(true).open(path)?.set_len(offset)?;
                    break;
                }
            }
        }

        debug!(path = %path.display(), entries = entries.len(), "journal replayed");
        Ok(entries)
    }

    fn encode_frame(entry: &JournalEntry) -> Result<Vec<u8>> {
        // Named encoding: Person skips absent optional fields.
        let encoded = rmp_serde::to_vec_named(entry)?;
        if encoded.len() > MAX_FRAME_BYTES {
            return Err(AttendanceError::InvalidArgument(format!(
                "record encodes to {} bytes, journal limit is {}",
                encoded.len(),
                MAX_FRAME_BYTES
            )));
        }

        let mut frame = Vec::with_capacity(encoded.len() + 8);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());
        Ok(frame)
    }

    fn read_frame(reader: &mut impl Read, remaining: u64) -> Result<Frame> {
        if remaining == 0 {
            return Ok(Frame::End);
        }
        if remaining < 8 {
            return Ok(Frame::Torn);
        }

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_BYTES {
            return Err(AttendanceError::Corruption("Journal frame too large".into()));
        }

        let frame_len = 8 + len as u64;
        if frame_len > remaining {
            return Ok(Frame::Torn);
        }

        let mut encoded = vec![0u8; len];
        reader.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;

        if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(&encoded) {
            // Only the last frame may be a partial write.
            if frame_len == remaining {
                return Ok(Frame::Torn);
            }
            return Err(AttendanceError::Corruption("Journal checksum mismatch".into()));
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok(Frame::Entry(entry, frame_len))
    }
}
