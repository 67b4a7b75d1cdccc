//! # Table engine
//!
//! Everything a table owns behind its core lock: the trie, the record store,
//! the variable heap, column cells and, for persistent tables, the journal.
//!
//! ## Write path
//!
//! ```text
//! mutate(...)
//!   ├─ validate against the in-memory state
//!   ├─ append the journal record (persistent tables)
//!   └─ apply_*: record store, then trie
//! ```
//!
//! The `apply_*` functions are shared with recovery, which replays the
//! journal on top of the last snapshot.
//!
//! ## On-disk layout
//!
//! ```text
//! <dir>/<table name>/table.snapshot   last checkpoint, footer holds last_seq
//! <dir>/<table name>/table.journal    records appended since, each with a seq
//! ```
//!
//! Journal records whose seq is at or below the snapshot's `last_seq` are
//! already part of the snapshot and are skipped on replay. Renaming a table
//! renames its directory in one step.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use datrie::{DoubleArrayTrie, Order};
use journal::{JournalReader, JournalRecord, JournalWriter};
use snapshot::{SnapshotEntry, SnapshotMeta, SnapshotReader, SnapshotWriter};
use tracing::{debug, info};
use varstore::{SegmentId, VariableStorage};

use crate::codec;
use crate::error::{corrupt, Result, TableError};
use crate::records::RecordStore;
use crate::types::{DataType, Key, Record, RecordId, Value};

/// Where a persistent table keeps its files.
#[derive(Debug, Clone)]
pub(crate) struct StorageLocation {
    pub(crate) dir: PathBuf,
    pub(crate) sync: bool,
}

#[derive(Debug)]
struct Persistence {
    location: StorageLocation,
    name: String,
    writer: JournalWriter,
    /// Sequence number of the last journal record written or recovered.
    seq: u64,
}

impl Persistence {
    fn table_dir(&self) -> PathBuf {
        self.location.dir.join(&self.name)
    }
}

/// Directory holding the files of table `name`.
pub(crate) fn table_dir(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

pub(crate) fn journal_path(table_dir: &Path) -> PathBuf {
    table_dir.join("table.journal")
}

pub(crate) fn snapshot_path(table_dir: &Path) -> PathBuf {
    table_dir.join("table.snapshot")
}

/// Cells of one column, indexed by `id - 1`.
#[derive(Debug)]
pub(crate) struct ColumnData {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    cells: Vec<Option<SegmentId>>,
}

#[derive(Debug)]
pub(crate) struct TableCore {
    pub(crate) key_type: DataType,
    pub(crate) value_type: Option<DataType>,
    pub(crate) trie: DoubleArrayTrie,
    records: RecordStore,
    heap: VariableStorage,
    columns: Vec<ColumnData>,
    persistence: Option<Persistence>,
}

impl TableCore {
    pub(crate) fn new(key_type: DataType, value_type: Option<DataType>) -> Self {
        let width = value_type.and_then(DataType::fixed_width).unwrap_or(0);
        Self {
            key_type,
            value_type,
            trie: DoubleArrayTrie::new(),
            records: RecordStore::new(width),
            heap: VariableStorage::new(),
            columns: Vec::new(),
            persistence: None,
        }
    }

    /// Opens a persistent core: loads the snapshot if present, replays the
    /// journal records it does not cover and keeps the journal open for
    /// appends.
    pub(crate) fn open(
        key_type: DataType,
        value_type: Option<DataType>,
        name: &str,
        location: StorageLocation,
    ) -> Result<Self> {
        let mut core = Self::new(key_type, value_type);
        let dir = table_dir(&location.dir, name);
        fs::create_dir_all(&dir)?;

        let mut covered = 0;
        let snap = snapshot_path(&dir);
        if snap.exists() {
            let reader = SnapshotReader::open(&snap).map_err(TableError::Snapshot)?;
            let id_limit = reader.id_limit();
            covered = reader.last_seq();
            for entry in reader.into_entries() {
                core.apply_add(RecordId(entry.id), &entry.key)?;
                if !entry.value.is_empty() {
                    core.records.set_value(RecordId(entry.id), &entry.value)?;
                }
            }
            core.records.reserve_ids(id_limit);
        }

        let journal = journal_path(&dir);
        let (mut seq, mut replayed, mut skipped) = (covered, 0usize, 0usize);
        if journal.exists() {
            let mut pending = Vec::new();
            JournalReader::open(&journal)?
                .replay(|s, r| pending.push((s, r)))?;
            for (record_seq, record) in pending {
                if record_seq <= covered {
                    skipped += 1;
                    continue;
                }
                core.apply(record)?;
                seq = seq.max(record_seq);
                replayed += 1;
            }
        }

        let writer = JournalWriter::create(&journal, location.sync)?;
        core.persistence = Some(Persistence {
            location,
            name: name.to_owned(),
            writer,
            seq,
        });
        debug!(
            table = name,
            records = core.records.len(),
            replayed,
            skipped,
            seq,
            "recovered table"
        );
        Ok(core)
    }

    pub(crate) fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    // -------------------- Lookups --------------------

    /// Record bound to an encoded key.
    pub(crate) fn find(&self, encoded: &[u8]) -> Result<Option<RecordId>> {
        match self.trie.get(encoded) {
            Some(raw) => self.checked_id(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Maps a trie value to a live record id.
    pub(crate) fn checked_id(&self, raw: u32) -> Result<RecordId> {
        let id = RecordId(raw);
        if self.records.contains(id) {
            Ok(id)
        } else {
            Err(corrupt(format!("trie points at dead record {id}")))
        }
    }

    pub(crate) fn contains(&self, id: RecordId) -> bool {
        self.records.contains(id)
    }

    pub(crate) fn key_bytes(&self, id: RecordId) -> Result<&[u8]> {
        self.records.key(id, &self.heap)
    }

    pub(crate) fn record(&self, id: RecordId) -> Result<Record> {
        let key = codec::decode_key(self.key_bytes(id)?, self.key_type)?;
        Ok(Record { id, key })
    }

    pub(crate) fn value(&self, id: RecordId) -> Result<Option<Value>> {
        match (self.records.value(id)?, self.value_type) {
            (Some(bytes), Some(ty)) => codec::decode_value(bytes, ty).map(Some),
            _ => Ok(None),
        }
    }

    // -------------------- Mutations --------------------

    /// Returns the record bound to `encoded`, creating it if needed.
    pub(crate) fn add(&mut self, encoded: &[u8]) -> Result<(RecordId, bool)> {
        if let Some(id) = self.find(encoded)? {
            return Ok((id, false));
        }
        let id = self.records.next_id()?;
        self.log(|| JournalRecord::Add {
            id: id.0,
            key: encoded.to_vec(),
        })?;
        self.apply_add(id, encoded)?;
        Ok((id, true))
    }

    /// Moves record `id` to `encoded`, keeping its id, value and columns.
    pub(crate) fn rekey(&mut self, id: RecordId, encoded: &[u8]) -> Result<()> {
        if self.key_bytes(id)? == encoded {
            return Ok(());
        }
        if let Some(other) = self.find(encoded)? {
            let key = codec::decode_key(encoded, self.key_type)?;
            return Err(TableError::DuplicateKey {
                key: key.to_string(),
                id: other,
            });
        }
        self.log(|| JournalRecord::Rekey {
            id: id.0,
            key: encoded.to_vec(),
        })?;
        self.apply_rekey(id, encoded)
    }

    pub(crate) fn delete(&mut self, id: RecordId) -> Result<()> {
        self.key_bytes(id)?;
        self.log(|| JournalRecord::Delete { id: id.0 })?;
        self.apply_delete(id)
    }

    pub(crate) fn set_value(&mut self, id: RecordId, value: &Value) -> Result<()> {
        let ty = self
            .value_type
            .ok_or(TableError::UnsupportedOperation("table has no value type"))?;
        let bytes = codec::encode_value(value, ty)?;
        self.key_bytes(id)?;
        self.log(|| JournalRecord::SetValue {
            id: id.0,
            value: bytes.clone(),
        })?;
        self.records.set_value(id, &bytes)
    }

    fn log(&mut self, record: impl FnOnce() -> JournalRecord) -> Result<()> {
        if let Some(p) = self.persistence.as_mut() {
            let seq = p.seq + 1;
            p.writer.append(seq, &record())?;
            p.seq = seq;
        }
        Ok(())
    }

    // -------------------- Apply (shared with recovery) --------------------

    fn apply(&mut self, record: JournalRecord) -> Result<()> {
        match record {
            JournalRecord::Add { id, key } => self.apply_add(RecordId(id), &key),
            JournalRecord::Rekey { id, key } => self.apply_rekey(RecordId(id), &key),
            JournalRecord::Delete { id } => self.apply_delete(RecordId(id)),
            JournalRecord::SetValue { id, value } => self.records.set_value(RecordId(id), &value),
        }
    }

    fn apply_add(&mut self, id: RecordId, encoded: &[u8]) -> Result<()> {
        self.records.allocate_at(id, encoded, &mut self.heap)?;
        match self.trie.insert_or_get(encoded, id.0) {
            Ok(entry) if entry.created => Ok(()),
            Ok(entry) => {
                self.records.release(id, &mut self.heap)?;
                Err(corrupt(format!(
                    "key already bound to record {}",
                    entry.value
                )))
            }
            Err(e) => {
                self.records.release(id, &mut self.heap)?;
                Err(e.into())
            }
        }
    }

    fn apply_rekey(&mut self, id: RecordId, encoded: &[u8]) -> Result<()> {
        let old = self.key_bytes(id)?.to_vec();
        self.records.rebind(id, encoded, &mut self.heap)?;
        if self.trie.remove(&old) != Some(id.0) {
            return Err(corrupt(format!("record {id} missing from the trie")));
        }
        let entry = self.trie.insert_or_get(encoded, id.0)?;
        if !entry.created {
            return Err(corrupt(format!(
                "key already bound to record {}",
                entry.value
            )));
        }
        Ok(())
    }

    fn apply_delete(&mut self, id: RecordId) -> Result<()> {
        let key = self.key_bytes(id)?.to_vec();
        if self.trie.remove(&key) != Some(id.0) {
            return Err(corrupt(format!("record {id} missing from the trie")));
        }
        let idx = id.0 as usize - 1;
        for column in &mut self.columns {
            if let Some(seg) = column.cells.get_mut(idx).and_then(Option::take) {
                self.heap.free(seg)?;
            }
        }
        self.records.release(id, &mut self.heap)
    }

    // -------------------- Columns --------------------

    pub(crate) fn define_column(&mut self, name: &str, data_type: DataType) -> Result<usize> {
        if self.column_index(name).is_some() {
            return Err(TableError::DuplicateName(name.to_owned()));
        }
        self.columns.push(ColumnData {
            name: name.to_owned(),
            data_type,
            cells: Vec::new(),
        });
        Ok(self.columns.len() - 1)
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub(crate) fn column(&self, index: usize) -> Result<&ColumnData> {
        self.columns
            .get(index)
            .ok_or_else(|| corrupt(format!("unknown column slot {index}")))
    }

    pub(crate) fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Encodes `value` for column `index` without storing it.
    pub(crate) fn encode_cell(&self, index: usize, value: &Value) -> Result<Vec<u8>> {
        codec::encode_value(value, self.column(index)?.data_type)
    }

    /// Stores already encoded `bytes` as the cell of `(index, id)`.
    pub(crate) fn write_cell(&mut self, index: usize, id: RecordId, bytes: &[u8]) -> Result<()> {
        self.key_bytes(id)?;
        self.column(index)?;
        let idx = id.0 as usize - 1;
        let column = &mut self.columns[index];
        if column.cells.len() <= idx {
            column.cells.resize(idx + 1, None);
        }
        match column.cells[idx] {
            Some(seg) => self.heap.replace(seg, bytes)?,
            None => column.cells[idx] = Some(self.heap.put(bytes)?),
        }
        Ok(())
    }

    pub(crate) fn read_cell(&self, index: usize, id: RecordId) -> Result<Option<Value>> {
        self.key_bytes(id)?;
        let column = self.column(index)?;
        match column.cells.get(id.0 as usize - 1).copied().flatten() {
            Some(seg) => codec::decode_value(self.heap.get(seg)?, column.data_type).map(Some),
            None => Ok(None),
        }
    }

    // -------------------- Maintenance --------------------

    pub(crate) fn defrag(&mut self, max_segments: Option<usize>) -> usize {
        self.heap.defrag(max_segments)
    }

    pub(crate) fn fragmentation(&self) -> f64 {
        self.heap.fragmentation()
    }

    pub(crate) fn storage_stats(&self) -> varstore::StorageStats {
        self.heap.stats()
    }

    /// Checks that the trie is well formed and that its terminals match the
    /// live records one to one.
    pub(crate) fn verify(&self) -> Result<()> {
        self.trie.verify()?;
        let mut terminals = 0usize;
        for raw in self.trie.iter(Order::Ascending) {
            let id = self.checked_id(raw)?;
            if self.trie.get(self.key_bytes(id)?) != Some(raw) {
                return Err(corrupt(format!("record {id} key does not lead back to it")));
            }
            terminals += 1;
        }
        if terminals != self.records.len() {
            return Err(corrupt(format!(
                "{terminals} trie terminals for {} records",
                self.records.len()
            )));
        }
        Ok(())
    }

    /// Writes a snapshot of every record and truncates the journal.
    ///
    /// The snapshot records the current seq, so a crash between the snapshot
    /// rename and the truncation leaves a journal that replays as a no-op.
    pub(crate) fn checkpoint(&mut self) -> Result<usize> {
        if self.persistence.is_none() {
            return Err(TableError::UnsupportedOperation("table is not persistent"));
        }
        let mut entries = Vec::with_capacity(self.records.len());
        for raw in self.trie.iter(Order::Ascending) {
            let id = self.checked_id(raw)?;
            entries.push(SnapshotEntry {
                id: raw,
                key: self.key_bytes(id)?.to_vec(),
                value: self
                    .records
                    .value(id)?
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
            });
        }
        let id_limit = self.records.id_limit();

        let Some(p) = self.persistence.as_mut() else {
            return Err(TableError::UnsupportedOperation("table is not persistent"));
        };
        let dir = p.table_dir();
        let meta = SnapshotMeta {
            id_limit,
            last_seq: p.seq,
        };
        SnapshotWriter::write(&snapshot_path(&dir), &entries, meta)
            .map_err(TableError::Snapshot)?;

        let journal = journal_path(&dir);
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&journal)?;
        p.writer = JournalWriter::create(&journal, p.location.sync)?;
        info!(
            table = %p.name,
            records = entries.len(),
            seq = p.seq,
            "checkpoint written"
        );
        Ok(entries.len())
    }

    /// Moves the table's directory to `new_name` with a single rename. The
    /// open journal handle follows the directory.
    pub(crate) fn rename_files(&mut self, new_name: &str) -> Result<()> {
        let Some(p) = self.persistence.as_mut() else {
            return Ok(());
        };
        let target = table_dir(&p.location.dir, new_name);
        if target.exists() {
            return Err(TableError::DuplicateName(new_name.to_owned()));
        }
        fs::rename(p.table_dir(), &target)?;
        p.name = new_name.to_owned();
        Ok(())
    }

    /// Deletes the table's files and turns it into an in-memory table.
    pub(crate) fn remove_files(&mut self) -> Result<()> {
        if let Some(p) = self.persistence.take() {
            let dir = p.table_dir();
            drop(p);
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Decodes an encoded key for error messages and records.
    pub(crate) fn decode(&self, encoded: &[u8]) -> Result<Key> {
        codec::decode_key(encoded, self.key_type)
    }
}
