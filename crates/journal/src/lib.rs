//! # Journal
//!
//! Append-only log of key-table mutations. Every structural change to a
//! persistent table is appended here before it is applied in memory; on open
//! the table replays the journal on top of its last snapshot.
//!
//! ## Record framing
//!
//! ```text
//! record_len (u32) | crc32(body) (u32) | body
//! body: seq (u64) | op (u8) | id (u32) | [len (u32) | bytes]
//! ```
//!
//! `record_len` counts the crc field plus the body. All integers are
//! little-endian.
//!
//! `seq` is assigned by the table and increases by one per record across
//! checkpoints, so a reader can skip records a snapshot already covers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

const OP_ADD: u8 = 0;
const OP_REKEY: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_SET_VALUE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// Record `id` was created for encoded key `key`.
    Add { id: u32, key: Vec<u8> },
    /// Record `id` now lives under encoded key `key`.
    Rekey { id: u32, key: Vec<u8> },
    /// Record `id` was deleted.
    Delete { id: u32 },
    /// The fixed-size value slot of `id` was overwritten.
    SetValue { id: u32, value: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record")]
    Corrupt,
}

/// Appends records to a journal file and optionally fsyncs each one.
#[derive(Debug)]
pub struct JournalWriter {
    file: File,
    sync: bool,
}

impl JournalWriter {
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self { file, sync })
    }

    /// Append a record. The full frame is written with a single `write_all`.
    pub fn append(&mut self, seq: u64, record: &JournalRecord) -> Result<(), JournalError> {
        let mut body = Vec::new();
        body.write_u64::<LittleEndian>(seq)?;
        match record {
            JournalRecord::Add { id, key } => {
                body.write_u8(OP_ADD)?;
                body.write_u32::<LittleEndian>(*id)?;
                write_bytes(&mut body, key)?;
            }
            JournalRecord::Rekey { id, key } => {
                body.write_u8(OP_REKEY)?;
                body.write_u32::<LittleEndian>(*id)?;
                write_bytes(&mut body, key)?;
            }
            JournalRecord::Delete { id } => {
                body.write_u8(OP_DELETE)?;
                body.write_u32::<LittleEndian>(*id)?;
            }
            JournalRecord::SetValue { id, value } => {
                body.write_u8(OP_SET_VALUE)?;
                body.write_u32::<LittleEndian>(*id)?;
                write_bytes(&mut body, value)?;
            }
        }

        let mut hasher = Crc32::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(body.len() + 8);
        frame.write_u32::<LittleEndian>(body.len() as u32 + 4)?;
        frame.write_u32::<LittleEndian>(crc)?;
        frame.extend_from_slice(&body);
        self.file.write_all(&frame)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    buf.write_u32::<LittleEndian>(bytes.len() as u32)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Reads journal records in append order.
pub struct JournalReader<R: Read> {
    rdr: BufReader<R>,
}

impl JournalReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<JournalReader<File>, JournalError> {
        let f = File::open(path)?;
        Ok(JournalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> JournalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        JournalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Feeds every valid record and its sequence number to `apply` and
    /// returns how many were read.
    ///
    /// Stops cleanly at EOF. A frame cut short by a crash (torn tail) ends
    /// the replay with a warning; a checksum mismatch or unknown op is
    /// reported as [`JournalError::Corrupt`].
    pub fn replay<F>(&mut self, mut apply: F) -> Result<usize, JournalError>
    where
        F: FnMut(u64, JournalRecord),
    {
        let mut count = 0usize;
        loop {
            let record_len = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(count),
                Err(e) => return Err(JournalError::Io(e)),
            };
            if record_len < 4 {
                return Err(JournalError::Corrupt);
            }

            let mut frame = vec![0u8; record_len as usize];
            if let Err(e) = self.rdr.read_exact(&mut frame) {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    warn!(records = count, "journal ends in a torn record, ignoring it");
                    return Ok(count);
                }
                return Err(JournalError::Io(e));
            }

            let (mut crc_bytes, body) = frame.split_at(4);
            let crc = crc_bytes.read_u32::<LittleEndian>()?;
            let mut hasher = Crc32::new();
            hasher.update(body);
            if hasher.finalize() != crc {
                return Err(JournalError::Corrupt);
            }

            let (seq, record) = parse_body(body)?;
            apply(seq, record);
            count += 1;
        }
    }
}

fn parse_body(mut body: &[u8]) -> Result<(u64, JournalRecord), JournalError> {
    let seq = body.read_u64::<LittleEndian>()?;
    let op = body.read_u8()?;
    let id = body.read_u32::<LittleEndian>()?;
    let record = match op {
        OP_ADD => JournalRecord::Add {
            id,
            key: read_bytes(&mut body)?,
        },
        OP_REKEY => JournalRecord::Rekey {
            id,
            key: read_bytes(&mut body)?,
        },
        OP_DELETE => JournalRecord::Delete { id },
        OP_SET_VALUE => JournalRecord::SetValue {
            id,
            value: read_bytes(&mut body)?,
        },
        _ => return Err(JournalError::Corrupt),
    };
    Ok((seq, record))
}
