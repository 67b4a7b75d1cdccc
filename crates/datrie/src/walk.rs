//! Resumable, ordered enumeration of a trie subtree.

use crate::{DoubleArrayTrie, NodeId, Order};

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    /// Next label to examine: counts up for ascending walks (256 = done),
    /// down for descending walks (-1 = done).
    next: i32,
    /// Ascending walks only: the node's own value was already considered.
    emitted: bool,
}

impl Frame {
    fn fresh(node: NodeId, order: Order) -> Self {
        Self {
            node,
            next: match order {
                Order::Ascending => 0,
                Order::Descending => u8::MAX as i32,
            },
            emitted: false,
        }
    }
}

/// Lazy walk over the terminal states below a prefix.
///
/// The walk does not borrow the trie: every [`next`](PrefixWalk::next) call
/// takes it by reference, so callers can release locks between steps. When
/// the trie's generation differs from the one the walk last saw, the frame
/// stack is rebuilt from the root right after the last yielded key. Nodes not
/// visited yet may then reflect either the old or the new trie state, but no
/// key is yielded twice and ordering is preserved.
///
/// Ascending order is a pre-order traversal with children in increasing byte
/// order; descending order is a post-order traversal with children in
/// decreasing byte order, i.e. the exact reverse.
#[derive(Debug, Clone)]
pub struct PrefixWalk {
    prefix: Vec<u8>,
    order: Order,
    stack: Vec<Frame>,
    /// Labels from the prefix state down to the top frame.
    path: Vec<u8>,
    /// Key suffix (below `prefix`) of the last yielded match.
    last: Option<Vec<u8>>,
    generation: Option<u64>,
}

impl PrefixWalk {
    /// Creates a walk over keys starting with `prefix[..max_prefix_bytes]`.
    pub fn new(prefix: &[u8], max_prefix_bytes: Option<usize>, order: Order) -> Self {
        let cut = max_prefix_bytes.map_or(prefix.len(), |n| n.min(prefix.len()));
        Self {
            prefix: prefix[..cut].to_vec(),
            order,
            stack: Vec::new(),
            path: Vec::new(),
            last: None,
            generation: None,
        }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// The effective (possibly truncated) prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Full key of the last yielded match.
    pub fn last_key(&self) -> Option<Vec<u8>> {
        self.last.as_ref().map(|suffix| {
            let mut key = self.prefix.clone();
            key.extend_from_slice(suffix);
            key
        })
    }

    /// Advances to the next terminal state and returns its value.
    pub fn next(&mut self, trie: &DoubleArrayTrie) -> Option<u32> {
        if self.generation != Some(trie.generation()) {
            self.seek(trie);
            self.generation = Some(trie.generation());
        }
        match self.order {
            Order::Ascending => self.step_ascending(trie),
            Order::Descending => self.step_descending(trie),
        }
    }

    fn step_ascending(&mut self, trie: &DoubleArrayTrie) -> Option<u32> {
        loop {
            let top = self.stack.last_mut()?;
            if !top.emitted {
                top.emitted = true;
                if let Some(v) = trie.value_at(top.node) {
                    self.last = Some(self.path.clone());
                    return Some(v);
                }
            }

            match trie.next_child(top.node, top.next) {
                Some((label, child)) => {
                    top.next = label as i32 + 1;
                    self.path.push(label);
                    self.stack.push(Frame::fresh(child, Order::Ascending));
                }
                None => {
                    self.stack.pop();
                    self.path.pop();
                }
            }
        }
    }

    fn step_descending(&mut self, trie: &DoubleArrayTrie) -> Option<u32> {
        loop {
            let top = self.stack.last_mut()?;
            match trie.prev_child(top.node, top.next) {
                Some((label, child)) => {
                    top.next = label as i32 - 1;
                    self.path.push(label);
                    self.stack.push(Frame::fresh(child, Order::Descending));
                }
                None => {
                    let node = top.node;
                    self.stack.pop();
                    let value = trie.value_at(node);
                    if value.is_some() {
                        self.last = Some(self.path.clone());
                    }
                    self.path.pop();
                    if value.is_some() {
                        return value;
                    }
                }
            }
        }
    }

    /// Rebuilds the frame stack so the walk continues right after the last
    /// yielded key (or from the start if nothing was yielded yet).
    fn seek(&mut self, trie: &DoubleArrayTrie) {
        self.stack.clear();
        self.path.clear();

        let Some(root) = trie.find(&self.prefix) else {
            return;
        };
        self.stack.push(Frame::fresh(root, self.order));

        let Some(last) = self.last.clone() else {
            return;
        };

        for &b in &last {
            let Some(top) = self.stack.last_mut() else {
                return;
            };
            match self.order {
                Order::Ascending => {
                    top.emitted = true;
                    top.next = b as i32 + 1;
                }
                Order::Descending => top.next = b as i32 - 1,
            }
            match trie.child(top.node, b) {
                Some(child) => {
                    self.path.push(b);
                    self.stack.push(Frame::fresh(child, self.order));
                }
                None => return,
            }
        }

        // The last yielded state itself.
        match self.order {
            Order::Ascending => {
                if let Some(top) = self.stack.last_mut() {
                    top.emitted = true;
                    top.next = 0;
                }
            }
            Order::Descending => {
                self.stack.pop();
                self.path.pop();
            }
        }
    }
}

/// Borrowing iterator form of [`PrefixWalk`].
pub struct PrefixIter<'a> {
    trie: &'a DoubleArrayTrie,
    walk: PrefixWalk,
}

impl<'a> PrefixIter<'a> {
    pub(crate) fn new(trie: &'a DoubleArrayTrie, walk: PrefixWalk) -> Self {
        Self { trie, walk }
    }
}

impl Iterator for PrefixIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        self.walk.next(self.trie)
    }
}
