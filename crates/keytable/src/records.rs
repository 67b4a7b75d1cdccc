//! Record store: id allocation, stored keys and fixed-width value slots.
//!
//! Record `id` lives in slot `id - 1`. Keys up to [`INLINE_KEY_BYTES`] are
//! kept inline; longer keys spill into the table's [`VariableStorage`].
//! Freed ids go back to an ordered free set and the lowest one is handed
//! out first.

use std::collections::BTreeSet;

use smallvec::SmallVec;
use varstore::{SegmentId, VariableStorage};

use crate::error::{corrupt, Result, TableError};
use crate::types::RecordId;

pub const INLINE_KEY_BYTES: usize = 16;

#[derive(Debug)]
enum StoredKey {
    Inline(SmallVec<[u8; INLINE_KEY_BYTES]>),
    Spilled(SegmentId),
}

#[derive(Debug)]
pub(crate) struct RecordStore {
    slots: Vec<Option<StoredKey>>,
    free_ids: BTreeSet<u32>,
    values: Vec<u8>,
    value_width: usize,
    live: usize,
}

impl RecordStore {
    pub(crate) fn new(value_width: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_ids: BTreeSet::new(),
            values: Vec::new(),
            value_width,
            live: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// One past the highest id ever handed out.
    pub(crate) fn id_limit(&self) -> u32 {
        self.slots.len() as u32 + 1
    }

    pub(crate) fn contains(&self, id: RecordId) -> bool {
        matches!(self.slot_index(id).map(|i| &self.slots[i]), Some(Some(_)))
    }

    /// The id the next [`allocate_at`](Self::allocate_at) should use.
    pub(crate) fn next_id(&self) -> Result<RecordId> {
        if let Some(&id) = self.free_ids.first() {
            return Ok(RecordId(id));
        }
        let id = self.id_limit();
        if id == u32::MAX {
            return Err(TableError::UnsupportedOperation("record ids exhausted"));
        }
        Ok(RecordId(id))
    }

    /// Makes `id` live with `key`. Ids skipped over become free.
    pub(crate) fn allocate_at(
        &mut self,
        id: RecordId,
        key: &[u8],
        heap: &mut VariableStorage,
    ) -> Result<()> {
        if id.0 == 0 || id.0 == u32::MAX {
            return Err(corrupt(format!("invalid record id {id}")));
        }
        let idx = id.0 as usize - 1;
        if idx < self.slots.len() && self.slots[idx].is_some() {
            return Err(corrupt(format!("record {id} is already live")));
        }

        let stored = store_key(key, heap)?;
        if idx >= self.slots.len() {
            self.grow_to(idx + 1);
        }
        self.free_ids.remove(&id.0);
        self.slots[idx] = Some(stored);
        self.live += 1;
        self.value_mut(idx).fill(0);
        Ok(())
    }

    /// Extends the id space so that every id below `limit` exists (free).
    pub(crate) fn reserve_ids(&mut self, limit: u32) {
        let slots = limit.saturating_sub(1) as usize;
        if slots > self.slots.len() {
            self.grow_to(slots);
        }
    }

    pub(crate) fn key<'a>(&'a self, id: RecordId, heap: &'a VariableStorage) -> Result<&'a [u8]> {
        match self.stored(id)? {
            StoredKey::Inline(bytes) => Ok(bytes.as_slice()),
            StoredKey::Spilled(seg) => Ok(heap.get(*seg)?),
        }
    }

    /// Replaces the stored key of `id`. The old key storage is released only
    /// after the new key is stored.
    pub(crate) fn rebind(
        &mut self,
        id: RecordId,
        key: &[u8],
        heap: &mut VariableStorage,
    ) -> Result<()> {
        self.stored(id)?;
        let stored = store_key(key, heap)?;
        let idx = id.0 as usize - 1;
        if let Some(StoredKey::Spilled(seg)) = self.slots[idx].replace(stored) {
            heap.free(seg)?;
        }
        Ok(())
    }

    pub(crate) fn release(&mut self, id: RecordId, heap: &mut VariableStorage) -> Result<()> {
        self.stored(id)?;
        let idx = id.0 as usize - 1;
        if let Some(StoredKey::Spilled(seg)) = self.slots[idx].take() {
            heap.free(seg)?;
        }
        self.value_mut(idx).fill(0);
        self.free_ids.insert(id.0);
        self.live -= 1;
        Ok(())
    }

    /// Value slot of `id`, `None` when the table has no value type.
    pub(crate) fn value(&self, id: RecordId) -> Result<Option<&[u8]>> {
        self.stored(id)?;
        if self.value_width == 0 {
            return Ok(None);
        }
        let start = (id.0 as usize - 1) * self.value_width;
        Ok(Some(&self.values[start..start + self.value_width]))
    }

    pub(crate) fn set_value(&mut self, id: RecordId, bytes: &[u8]) -> Result<()> {
        self.stored(id)?;
        if bytes.len() != self.value_width {
            return Err(corrupt(format!(
                "value slot holds {} bytes, got {}",
                self.value_width,
                bytes.len()
            )));
        }
        self.value_mut(id.0 as usize - 1).copy_from_slice(bytes);
        Ok(())
    }

    fn stored(&self, id: RecordId) -> Result<&StoredKey> {
        self.slot_index(id)
            .and_then(|i| self.slots[i].as_ref())
            .ok_or_else(|| TableError::NotFound(format!("record {id}")))
    }

    fn slot_index(&self, id: RecordId) -> Option<usize> {
        let idx = (id.0 as usize).checked_sub(1)?;
        (idx < self.slots.len()).then_some(idx)
    }

    fn grow_to(&mut self, slots: usize) {
        for idx in self.slots.len()..slots {
            self.slots.push(None);
            self.free_ids.insert(idx as u32 + 1);
        }
        self.values.resize(slots * self.value_width, 0);
    }

    fn value_mut(&mut self, idx: usize) -> &mut [u8] {
        let start = idx * self.value_width;
        &mut self.values[start..start + self.value_width]
    }
}

fn store_key(key: &[u8], heap: &mut VariableStorage) -> Result<StoredKey> {
    if key.len() <= INLINE_KEY_BYTES {
        Ok(StoredKey::Inline(SmallVec::from_slice(key)))
    } else {
        Ok(StoredKey::Spilled(heap.put(key)?))
    }
}
