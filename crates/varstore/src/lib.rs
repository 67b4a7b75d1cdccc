//! # Variable storage
//!
//! A flat, append-growing byte heap holding variable-length segments: keys
//! too long to inline in the record store and column values.
//!
//! ## Segment layout
//!
//! ```text
//! ┌──────────────────┬──────────────────┬────────────────────────┐
//! │ capacity (u32 LE)│ owner (u32 LE)   │ payload (capacity bytes)│
//! └──────────────────┴──────────────────┴────────────────────────┘
//! ```
//!
//! `owner` is the segment's handle, or `DEAD` once the segment was freed.
//! Because every segment is self-describing, the heap can be scanned
//! front to back without any side table.
//!
//! ## Handles
//!
//! Callers never see offsets. [`VariableStorage::put`] returns a
//! [`SegmentId`] resolved through a handle table; [`VariableStorage::defrag`]
//! rewrites offsets behind the handles, so ids stay valid across compaction.
//!
//! ## Reclamation
//!
//! Freeing a segment only flips its owner to `DEAD` and records it in the
//! free map (adjacent dead segments are merged). Allocation reuses dead
//! segments first-fit. Compaction happens only when a caller asks for it.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Bytes of the per-segment header: capacity (u32) + owner (u32).
pub const HEADER_BYTES: usize = 8;

/// Largest payload a single segment can hold.
pub const MAX_SEGMENT_BYTES: usize = u32::MAX as usize - 1;

const DEAD: u32 = u32::MAX;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("unknown segment {0}")]
    UnknownSegment(u32),
    #[error("segment of {0} bytes exceeds the maximum segment size")]
    TooLarge(usize),
}

/// Stable handle to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u32);

impl SegmentId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: usize,
    /// Payload bytes in use; the header records the capacity.
    len: usize,
}

/// Heap usage counters, see [`VariableStorage::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    pub live_segments: usize,
    pub dead_segments: usize,
    /// Payload bytes in use by live segments.
    pub live_bytes: usize,
    /// Bytes (headers included) held by dead segments.
    pub dead_bytes: usize,
    pub heap_bytes: usize,
}

/// Segment heap with stable handles, first-fit reuse and on-demand compaction.
#[derive(Debug, Default)]
pub struct VariableStorage {
    heap: Vec<u8>,
    slots: Vec<Option<Slot>>,
    free_handles: Vec<u32>,
    /// Dead segments: offset → capacity.
    free: BTreeMap<usize, usize>,
}

impl VariableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` in a new segment.
    pub fn put(&mut self, bytes: &[u8]) -> Result<SegmentId, StorageError> {
        if bytes.len() > MAX_SEGMENT_BYTES {
            return Err(StorageError::TooLarge(bytes.len()));
        }
        let handle = match self.free_handles.pop() {
            Some(h) => h,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };
        let offset = self.place(bytes, handle);
        self.slots[handle as usize] = Some(Slot {
            offset,
            len: bytes.len(),
        });
        Ok(SegmentId(handle))
    }

    /// Returns the payload of segment `id`.
    pub fn get(&self, id: SegmentId) -> Result<&[u8], StorageError> {
        let slot = self.slot(id)?;
        let start = slot.offset + HEADER_BYTES;
        Ok(&self.heap[start..start + slot.len])
    }

    /// Replaces the payload of `id`, in place when it fits the segment's
    /// capacity; otherwise the old segment dies and `id` moves to a new one.
    pub fn replace(&mut self, id: SegmentId, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.len() > MAX_SEGMENT_BYTES {
            return Err(StorageError::TooLarge(bytes.len()));
        }
        let slot = self.slot(id)?;
        let capacity = self.capacity_at(slot.offset);

        let offset = if bytes.len() <= capacity {
            let start = slot.offset + HEADER_BYTES;
            self.heap[start..start + bytes.len()].copy_from_slice(bytes);
            slot.offset
        } else {
            self.kill(slot.offset);
            self.place(bytes, id.0)
        };

        self.slots[id.0 as usize] = Some(Slot {
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    /// Frees segment `id`. The space stays in the heap until reused or
    /// reclaimed by [`defrag`](Self::defrag).
    pub fn free(&mut self, id: SegmentId) -> Result<(), StorageError> {
        let slot = self.slot(id)?;
        self.kill(slot.offset);
        self.slots[id.0 as usize] = None;
        self.free_handles.push(id.0);
        Ok(())
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.slot(id).is_ok()
    }

    /// Total heap size in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.heap.len()
    }

    pub fn stats(&self) -> StorageStats {
        let (live_segments, live_bytes) = self
            .slots
            .iter()
            .flatten()
            .fold((0, 0), |(n, b), s| (n + 1, b + s.len));
        StorageStats {
            live_segments,
            dead_segments: self.free.len(),
            live_bytes,
            dead_bytes: self.free.values().map(|c| HEADER_BYTES + c).sum(),
            heap_bytes: self.heap.len(),
        }
    }

    /// Dead bytes over heap bytes; `0.0` for an empty heap.
    pub fn fragmentation(&self) -> f64 {
        let stats = self.stats();
        if stats.heap_bytes == 0 {
            return 0.0;
        }
        stats.dead_bytes as f64 / stats.heap_bytes as f64
    }

    /// Repacks live segments towards the start of the heap.
    ///
    /// Walks the heap in offset order, dropping dead segments and sliding live
    /// ones down over the gap. Returns how many segments were moved or
    /// reclaimed; `0` means the heap had nothing to compact. With
    /// `max_segments` the pass stops after that many; the remaining gap is
    /// left behind as one dead segment so a later pass can pick up.
    pub fn defrag(&mut self, max_segments: Option<usize>) -> usize {
        let end = self.heap.len();
        let limit = max_segments.unwrap_or(usize::MAX);
        let mut processed = 0usize;
        let mut reclaimed = 0usize;
        let mut read = 0usize;
        let mut write = 0usize;

        while read < end {
            let capacity = self.capacity_at(read);
            let owner = self.owner_at(read);
            let segment_bytes = HEADER_BYTES + capacity;

            if owner == DEAD {
                if processed >= limit {
                    break;
                }
                processed += 1;
                reclaimed += 1;
                read += segment_bytes;
                continue;
            }

            if read != write {
                if processed >= limit {
                    break;
                }
                let used = self
                    .slots
                    .get(owner as usize)
                    .copied()
                    .flatten()
                    .map_or(capacity, |s| s.len);
                self.heap
                    .copy_within(read..read + HEADER_BYTES + used, write);
                if let Some(Some(slot)) = self.slots.get_mut(owner as usize) {
                    slot.offset = write;
                }
                processed += 1;
            }
            write += segment_bytes;
            read += segment_bytes;
        }

        if write < read {
            if read >= end {
                self.heap.truncate(write);
            } else {
                let gap = read - write - HEADER_BYTES;
                self.write_header(write, gap, DEAD);
            }
        }
        self.rebuild_free_map();

        if processed > 0 {
            debug!(
                processed,
                reclaimed,
                heap_bytes = self.heap.len(),
                "defragmented variable storage"
            );
        }
        processed
    }

    fn slot(&self, id: SegmentId) -> Result<Slot, StorageError> {
        self.slots
            .get(id.0 as usize)
            .copied()
            .flatten()
            .ok_or(StorageError::UnknownSegment(id.0))
    }

    fn capacity_at(&self, offset: usize) -> usize {
        LittleEndian::read_u32(&self.heap[offset..offset + 4]) as usize
    }

    fn owner_at(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(&self.heap[offset + 4..offset + 8])
    }

    fn write_header(&mut self, offset: usize, capacity: usize, owner: u32) {
        LittleEndian::write_u32(&mut self.heap[offset..offset + 4], capacity as u32);
        LittleEndian::write_u32(&mut self.heap[offset + 4..offset + 8], owner);
    }

    /// Writes `bytes` into a reused dead segment or at the end of the heap.
    fn place(&mut self, bytes: &[u8], owner: u32) -> usize {
        let fit = self
            .free
            .iter()
            .find(|(_, cap)| **cap >= bytes.len())
            .map(|(&off, &cap)| (off, cap));

        let offset = match fit {
            Some((offset, capacity)) => {
                self.free.remove(&offset);
                let spare = capacity - bytes.len();
                let capacity = if spare > HEADER_BYTES {
                    let rest = offset + HEADER_BYTES + bytes.len();
                    let rest_capacity = spare - HEADER_BYTES;
                    self.write_header(rest, rest_capacity, DEAD);
                    self.free.insert(rest, rest_capacity);
                    bytes.len()
                } else {
                    capacity
                };
                self.write_header(offset, capacity, owner);
                offset
            }
            None => {
                let offset = self.heap.len();
                self.heap.resize(offset + HEADER_BYTES, 0);
                self.write_header(offset, bytes.len(), owner);
                self.heap.extend_from_slice(bytes);
                return offset;
            }
        };

        let start = offset + HEADER_BYTES;
        self.heap[start..start + bytes.len()].copy_from_slice(bytes);
        offset
    }

    /// Marks the segment at `offset` dead and merges it with dead neighbours.
    fn kill(&mut self, offset: usize) {
        let mut offset = offset;
        let mut capacity = self.capacity_at(offset);

        let next = offset + HEADER_BYTES + capacity;
        if let Some(next_capacity) = self.free.remove(&next) {
            capacity += HEADER_BYTES + next_capacity;
        }
        let prev = self
            .free
            .range(..offset)
            .next_back()
            .map(|(&o, &c)| (o, c));
        if let Some((prev_offset, prev_capacity)) = prev {
            if prev_offset + HEADER_BYTES + prev_capacity == offset {
                self.free.remove(&prev_offset);
                offset = prev_offset;
                capacity += HEADER_BYTES + prev_capacity;
            }
        }

        self.write_header(offset, capacity, DEAD);
        self.free.insert(offset, capacity);
    }

    fn rebuild_free_map(&mut self) {
        self.free.clear();
        let mut offset = 0;
        while offset < self.heap.len() {
            let capacity = self.capacity_at(offset);
            if self.owner_at(offset) == DEAD {
                self.free.insert(offset, capacity);
            }
            offset += HEADER_BYTES + capacity;
        }
    }
}
