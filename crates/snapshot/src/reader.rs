use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::Read;
use std::path::Path;

use crate::format::{read_footer, FOOTER_BYTES, SNAPSHOT_MAGIC};
use crate::SnapshotEntry;

/// Loads a snapshot file fully into memory.
///
/// Snapshots are read once, at table open, and every entry is needed to
/// rebuild the trie, so there is no point in lazy access.
#[derive(Debug)]
pub struct SnapshotReader {
    entries: Vec<SnapshotEntry>,
    id_limit: u32,
    last_seq: u64,
}

impl SnapshotReader {
    /// Opens and validates a snapshot.
    ///
    /// # Validation
    ///
    /// - The file must be at least [`FOOTER_BYTES`] long.
    /// - The footer magic must equal `0x4B54_5331` ("KTS1").
    /// - The data section must match the footer checksum and entry count.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        if (bytes.len() as u64) < FOOTER_BYTES {
            bail!("snapshot file too small");
        }

        let split = bytes.len() - FOOTER_BYTES as usize;
        let (data, mut footer_bytes) = bytes.split_at(split);
        let footer = read_footer(&mut footer_bytes)?;
        if footer.magic != SNAPSHOT_MAGIC {
            bail!("invalid snapshot magic: {:x}", footer.magic);
        }

        let mut hasher = Crc32::new();
        hasher.update(data);
        if hasher.finalize() != footer.crc {
            bail!("snapshot checksum mismatch");
        }

        let mut entries = Vec::with_capacity(footer.count as usize);
        let mut rdr = data;
        while !rdr.is_empty() {
            let key_len = rdr.read_u32::<LittleEndian>()? as usize;
            let mut key = vec![0u8; key_len];
            rdr.read_exact(&mut key)?;
            let id = rdr.read_u32::<LittleEndian>()?;
            let value_len = rdr.read_u32::<LittleEndian>()? as usize;
            let mut value = vec![0u8; value_len];
            rdr.read_exact(&mut value)?;
            entries.push(SnapshotEntry { id, key, value });
        }

        if entries.len() as u64 != footer.count {
            bail!(
                "snapshot holds {} entries, footer says {}",
                entries.len(),
                footer.count
            );
        }

        Ok(Self {
            entries,
            id_limit: footer.id_limit,
            last_seq: footer.last_seq,
        })
    }

    /// Entries in ascending key order.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<SnapshotEntry> {
        self.entries
    }

    /// One past the highest record id allocated when the snapshot was taken.
    pub fn id_limit(&self) -> u32 {
        self.id_limit
    }

    /// Journal records up to and including this sequence number are already
    /// reflected in the entries.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
