//! Prefix cursors over a table's keys.

use std::sync::Arc;

use datrie::{Order, PrefixWalk};

use crate::error::Result;
use crate::table::Shared;
use crate::types::{Key, Record};

/// Options for [`Table::open_prefix_cursor`](crate::Table::open_prefix_cursor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorOptions {
    pub order: Order,
    /// Only the first `key_bytes` bytes of the prefix are matched.
    pub key_bytes: Option<usize>,
    /// Matches to skip before the first yielded record.
    pub offset: usize,
    /// Maximum number of records to yield.
    pub limit: Option<usize>,
}

impl CursorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn descending(self) -> Self {
        self.order(Order::Descending)
    }

    pub fn key_bytes(mut self, key_bytes: usize) -> Self {
        self.key_bytes = Some(key_bytes);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Lazily yields the records whose encoded key starts with a prefix.
///
/// The cursor keeps the table alive but holds no lock between steps: each
/// call to `next` takes the core read lock for that step only. Records added
/// or removed while the cursor is open may or may not be observed; records
/// are never yielded twice and order is preserved.
pub struct PrefixCursor {
    shared: Arc<Shared>,
    walk: PrefixWalk,
    skip: usize,
    remaining: Option<usize>,
    done: bool,
}

impl PrefixCursor {
    pub(crate) fn new(shared: Arc<Shared>, prefix: &[u8], options: CursorOptions) -> Self {
        Self {
            shared,
            walk: PrefixWalk::new(prefix, options.key_bytes, options.order),
            skip: options.offset,
            remaining: options.limit,
            done: false,
        }
    }

    pub fn order(&self) -> Order {
        self.walk.order()
    }

    /// Collects the keys of the remaining records.
    pub fn keys(self) -> Result<Vec<Key>> {
        self.map(|r| r.map(|record| record.key)).collect()
    }
}

impl Iterator for PrefixCursor {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            self.done = true;
            return None;
        }

        let core = self.shared.core.read();
        loop {
            let Some(raw) = self.walk.next(&core.trie) else {
                self.done = true;
                return None;
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(n) = self.remaining.as_mut() {
                *n -= 1;
            }
            let record = core.checked_id(raw).and_then(|id| core.record(id));
            if record.is_err() {
                self.done = true;
            }
            return Some(record);
        }
    }
}
