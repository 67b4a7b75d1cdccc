//! # Double-array trie
//!
//! The structural index of the key table: maps byte strings to `u32` values
//! (record ids) using the classic `base`/`check` array pair.
//!
//! ## Layout
//!
//! Every trie state is a slot index into three parallel, flat arrays:
//!
//! ```text
//! base[s]   first slot of s's child block (0 = no children yet)
//! check[s]  parent of s (FREE for unused slots, 0 for the root)
//! value[s]  bound value if s is terminal, EMPTY otherwise
//! ```
//!
//! A transition `s --c--> t` exists iff `t == base[s] + c` and
//! `check[t] == s`. Slot 0 is always the root; bases are at least 1 so no
//! transition can ever target the root slot.
//!
//! ## Key properties
//! - **O(1) per byte**: lookups are one addition and one comparison per byte.
//! - **Batched relocation**: when a new child collides with a slot owned by
//!   another parent, all children of the inserting node move to the first free
//!   block wide enough and grandchildren are re-parented.
//! - **Ordered walks**: [`PrefixWalk`] enumerates a subtree in ascending or
//!   descending byte order and survives concurrent structural changes by
//!   re-seeking when the trie's generation changes.
//!
//! ## Example
//! ```rust
//! use datrie::{DoubleArrayTrie, Order};
//!
//! let mut trie = DoubleArrayTrie::new();
//! trie.insert_or_get(b"/usr/bin", 1).unwrap();
//! trie.insert_or_get(b"/tmp", 2).unwrap();
//! assert_eq!(trie.get(b"/tmp"), Some(2));
//!
//! let values: Vec<u32> = trie.iter_prefix(b"/", None, Order::Ascending).collect();
//! assert_eq!(values, vec![2, 1]);
//! ```

mod walk;

pub use walk::{PrefixIter, PrefixWalk};

use thiserror::Error;
use tracing::debug;

/// Slot index of a trie state.
pub type NodeId = u32;

/// Slot index of the root state.
pub const ROOT: NodeId = 0;

/// `check` marker for unused slots.
const FREE: u32 = u32::MAX;

/// `value` marker for non-terminal states. Not a legal value.
pub const EMPTY: u32 = u32::MAX;

const MIN_CAPACITY: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// A base/check invariant does not hold. Never repaired in place.
    #[error("corrupt trie: {0}")]
    Corrupt(String),
    #[error("value {0:#x} is reserved")]
    ReservedValue(u32),
}

/// Traversal order for prefix walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Outcome of [`DoubleArrayTrie::insert_or_get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// State the key ends at. Only stable until the next structural change.
    pub node: NodeId,
    /// Value bound to the key: the new one if `created`, else the existing one.
    pub value: u32,
    /// `true` if this call made the key terminal.
    pub created: bool,
}

/// A double-array trie over byte keys with `u32` values.
#[derive(Debug, Clone)]
pub struct DoubleArrayTrie {
    base: Vec<u32>,
    check: Vec<u32>,
    value: Vec<u32>,
    /// Number of terminal states.
    len: usize,
    /// Lowest slot that may be free; first-fit scans start here.
    free_hint: usize,
    /// Bumped on every structural change, consumed by [`PrefixWalk`].
    generation: u64,
}

impl DoubleArrayTrie {
    /// Creates a trie holding only the (non-terminal) root.
    pub fn new() -> Self {
        let mut trie = Self {
            base: vec![0; MIN_CAPACITY],
            check: vec![FREE; MIN_CAPACITY],
            value: vec![EMPTY; MIN_CAPACITY],
            len: 0,
            free_hint: 1,
            generation: 0,
        };
        trie.check[ROOT as usize] = ROOT;
        trie
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Structural generation. Any insert that creates states, relocation or
    /// removal changes it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of slots currently in use, root included.
    pub fn node_count(&self) -> usize {
        self.check.iter().filter(|&&c| c != FREE).count()
    }

    /// Length of the base/check arrays.
    pub fn capacity(&self) -> usize {
        self.check.len()
    }

    /// Returns the state reached by consuming all of `key`, terminal or not.
    pub fn find(&self, key: &[u8]) -> Option<NodeId> {
        let mut s = ROOT;
        for &c in key {
            s = self.child(s, c)?;
        }
        Some(s)
    }

    /// Returns the value bound to `key`, if `key` is stored.
    pub fn get(&self, key: &[u8]) -> Option<u32> {
        self.find(key).and_then(|s| self.value_at(s))
    }

    /// Returns `true` if `key` is stored.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Value of state `node` if it is terminal.
    pub fn value_at(&self, node: NodeId) -> Option<u32> {
        match self.value.get(node as usize) {
            Some(&v) if v != EMPTY => Some(v),
            _ => None,
        }
    }

    /// Follows the transition `node --label-->`.
    pub fn child(&self, node: NodeId, label: u8) -> Option<NodeId> {
        let b = *self.base.get(node as usize)? as usize;
        if b == 0 {
            return None;
        }
        let t = b + label as usize;
        match self.check.get(t) {
            Some(&p) if p == node => Some(t as NodeId),
            _ => None,
        }
    }

    /// First child of `node` with a label `>= from`, in increasing order.
    pub(crate) fn next_child(&self, node: NodeId, from: i32) -> Option<(u8, NodeId)> {
        if !(0..=255).contains(&from) {
            return None;
        }
        (from as u8..=u8::MAX).find_map(|c| self.child(node, c).map(|t| (c, t)))
    }

    /// Last child of `node` with a label `<= from`, in decreasing order.
    pub(crate) fn prev_child(&self, node: NodeId, from: i32) -> Option<(u8, NodeId)> {
        if !(0..=255).contains(&from) {
            return None;
        }
        (0..=from as u8)
            .rev()
            .find_map(|c| self.child(node, c).map(|t| (c, t)))
    }

    /// Inserts `key` bound to `value`, or returns the existing binding.
    ///
    /// An existing key is left untouched (`created == false`). Missing states
    /// are allocated along the way, relocating sibling blocks on collision.
    ///
    /// # Errors
    ///
    /// [`TrieError::ReservedValue`] if `value` is [`EMPTY`];
    /// [`TrieError::Corrupt`] if a relocation target turns out to be occupied.
    pub fn insert_or_get(&mut self, key: &[u8], value: u32) -> Result<Entry, TrieError> {
        if value == EMPTY {
            return Err(TrieError::ReservedValue(value));
        }

        let mut s = ROOT;
        for &c in key {
            s = match self.child(s, c) {
                Some(t) => t,
                None => self.add_child(s, c)?,
            };
        }

        let slot = s as usize;
        if self.value[slot] != EMPTY {
            return Ok(Entry {
                node: s,
                value: self.value[slot],
                created: false,
            });
        }

        self.value[slot] = value;
        self.len += 1;
        self.generation += 1;
        Ok(Entry {
            node: s,
            value,
            created: true,
        })
    }

    /// Removes `key`, returning its value.
    ///
    /// The state becomes non-terminal; states left with neither a value nor
    /// children are released bottom-up.
    pub fn remove(&mut self, key: &[u8]) -> Option<u32> {
        let s = self.find(key)?;
        let v = self.value_at(s)?;

        self.value[s as usize] = EMPTY;
        self.len -= 1;
        self.generation += 1;

        let mut node = s;
        while node != ROOT && self.value[node as usize] == EMPTY && !self.has_children(node) {
            let parent = self.check[node as usize];
            self.release(node as usize);
            node = parent;
        }
        if !self.has_children(node) {
            self.base[node as usize] = 0;
        }

        Some(v)
    }

    /// Iterates values under `prefix` (truncated to `max_prefix_bytes`).
    pub fn iter_prefix(
        &self,
        prefix: &[u8],
        max_prefix_bytes: Option<usize>,
        order: Order,
    ) -> PrefixIter<'_> {
        PrefixIter::new(self, PrefixWalk::new(prefix, max_prefix_bytes, order))
    }

    /// Iterates every value in key order.
    pub fn iter(&self, order: Order) -> PrefixIter<'_> {
        self.iter_prefix(&[], None, order)
    }

    /// Checks the base/check invariant over every used slot.
    pub fn verify(&self) -> Result<(), TrieError> {
        if self.check[ROOT as usize] != ROOT {
            return Err(TrieError::Corrupt("root slot is not self-owned".into()));
        }

        let mut terminals = 0usize;
        for (i, &parent) in self.check.iter().enumerate() {
            if parent == FREE {
                if self.value[i] != EMPTY {
                    return Err(TrieError::Corrupt(format!("free slot {i} holds a value")));
                }
                continue;
            }
            if self.value[i] != EMPTY {
                terminals += 1;
            }
            if i == ROOT as usize {
                continue;
            }

            let p = parent as usize;
            if p >= self.check.len() || self.check[p] == FREE {
                return Err(TrieError::Corrupt(format!(
                    "slot {i} points at unused parent {p}"
                )));
            }
            let pb = self.base[p] as usize;
            if pb == 0 || i < pb || i - pb > u8::MAX as usize {
                return Err(TrieError::Corrupt(format!(
                    "slot {i} is outside the child block of {p} (base {pb})"
                )));
            }
        }

        if terminals != self.len {
            return Err(TrieError::Corrupt(format!(
                "{terminals} terminal states but {} keys",
                self.len
            )));
        }
        Ok(())
    }

    fn has_children(&self, node: NodeId) -> bool {
        self.next_child(node, 0).is_some()
    }

    fn children(&self, node: NodeId) -> Vec<u8> {
        (0..=u8::MAX)
            .filter(|&c| self.child(node, c).is_some())
            .collect()
    }

    fn is_free(&self, slot: usize) -> bool {
        slot >= self.check.len() || self.check[slot] == FREE
    }

    fn ensure_capacity(&mut self, slot: usize) {
        if slot < self.check.len() {
            return;
        }
        let len = self.check.len();
        let new_len = (slot + 1).max(len + len / 2).max(MIN_CAPACITY);
        self.base.resize(new_len, 0);
        self.check.resize(new_len, FREE);
        self.value.resize(new_len, EMPTY);
    }

    fn occupy(&mut self, slot: usize, parent: NodeId) {
        self.ensure_capacity(slot);
        self.check[slot] = parent;
        self.base[slot] = 0;
        self.value[slot] = EMPTY;
        while self.free_hint < self.check.len() && self.check[self.free_hint] != FREE {
            self.free_hint += 1;
        }
    }

    fn release(&mut self, slot: usize) {
        self.check[slot] = FREE;
        self.base[slot] = 0;
        self.value[slot] = EMPTY;
        self.free_hint = self.free_hint.min(slot);
    }

    /// First base `b >= 1` such that `b + c` is free for every label.
    /// `labels` must be sorted and non-empty.
    fn find_base(&self, labels: &[u8]) -> usize {
        let first = labels[0] as usize;
        let mut pos = self.free_hint.max(first + 1);
        loop {
            if self.is_free(pos) {
                let b = pos - first;
                if labels.iter().all(|&c| self.is_free(b + c as usize)) {
                    return b;
                }
            }
            pos += 1;
        }
    }

    fn add_child(&mut self, node: NodeId, label: u8) -> Result<NodeId, TrieError> {
        let b = self.base[node as usize] as usize;
        if b != 0 && self.is_free(b + label as usize) {
            let t = b + label as usize;
            self.occupy(t, node);
            self.generation += 1;
            return Ok(t as NodeId);
        }

        let existing = self.children(node);
        let mut labels = existing.clone();
        labels.push(label);
        labels.sort_unstable();

        let new_base = self.find_base(&labels);
        if b != 0 && !existing.is_empty() {
            self.relocate(node, b, new_base, &existing)?;
        }
        self.base[node as usize] = new_base as u32;

        let t = new_base + label as usize;
        if !self.is_free(t) {
            return Err(TrieError::Corrupt(format!(
                "slot {t} chosen for a new child of {node} is occupied"
            )));
        }
        self.occupy(t, node);
        self.generation += 1;
        Ok(t as NodeId)
    }

    /// Moves every child of `node` from `old_base` to `new_base` and rebinds
    /// the grandchildren's `check` to the moved slots.
    fn relocate(
        &mut self,
        node: NodeId,
        old_base: usize,
        new_base: usize,
        labels: &[u8],
    ) -> Result<(), TrieError> {
        for &c in labels {
            let from = old_base + c as usize;
            let to = new_base + c as usize;
            if !self.is_free(to) {
                return Err(TrieError::Corrupt(format!(
                    "relocation target {to} for child {c:#04x} of {node} is occupied"
                )));
            }

            let child_base = self.base[from];
            let child_value = self.value[from];
            self.occupy(to, node);
            self.base[to] = child_base;
            self.value[to] = child_value;

            if child_base != 0 {
                for g in 0..=u8::MAX as usize {
                    let gt = child_base as usize + g;
                    if gt < self.check.len() && self.check[gt] == from as u32 {
                        self.check[gt] = to as u32;
                    }
                }
            }
            self.release(from);
        }

        self.generation += 1;
        debug!(
            node,
            from = old_base,
            to = new_base,
            children = labels.len(),
            "relocated child block"
        );
        Ok(())
    }
}

impl Default for DoubleArrayTrie {
    fn default() -> Self {
        Self::new()
    }
}
