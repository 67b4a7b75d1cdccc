use anyhow::{bail, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{rename, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::format::{write_footer, Footer, SNAPSHOT_MAGIC};
use crate::SnapshotEntry;

/// Table-level facts stored in the snapshot footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// One past the highest record id ever allocated.
    pub id_limit: u32,
    /// Sequence number of the last journal record folded into the snapshot.
    pub last_seq: u64,
}

/// Writes a table's live records to disk as an immutable snapshot file.
///
/// Stateless: all work happens in [`write`](SnapshotWriter::write). The data
/// is written to a temporary file, fsynced, and atomically renamed over the
/// final path, so a crash never leaves a half-written snapshot in place.
pub struct SnapshotWriter {}

impl SnapshotWriter {
    /// Writes `entries` to a new snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys are not strictly ascending (the table
    /// always hands them over in trie order, anything else is a logic bug)
    /// or on any I/O failure.
    pub fn write(path: &Path, entries: &[SnapshotEntry], meta: SnapshotMeta) -> Result<()> {
        for pair in entries.windows(2) {
            if pair[0].key >= pair[1].key {
                bail!("snapshot entries are not in ascending key order");
            }
        }

        let mut data = Vec::new();
        for entry in entries {
            data.write_u32::<LittleEndian>(entry.key.len() as u32)?;
            data.extend_from_slice(&entry.key);
            data.write_u32::<LittleEndian>(entry.id)?;
            data.write_u32::<LittleEndian>(entry.value.len() as u32)?;
            data.extend_from_slice(&entry.value);
        }

        let mut hasher = Crc32::new();
        hasher.update(&data);
        let crc = hasher.finalize();

        let tmp_path = path.with_extension("snapshot.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        file.write_all(&data)?;
        let footer = Footer {
            count: entries.len() as u64,
            id_limit: meta.id_limit,
            last_seq: meta.last_seq,
            crc,
            magic: SNAPSHOT_MAGIC,
        };
        write_footer(&mut file, &footer)?;

        file.flush()?;
        file.sync_all()?;

        rename(tmp_path, path)?;
        Ok(())
    }
}
