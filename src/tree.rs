//! The outer tree: owns the root node and the key geometry, and drives the
//! recursive node operations.

use std::collections::btree_map;

use crate::bits::HcPos;
use crate::node::{Node, RemoveOutcome};
use crate::store::{Entry, Payload};

/// A multi-dimensional point index over `u64` coordinates.
///
/// Keys are `&[u64]` slices with one word per dimension, at most `depth`
/// significant bits each. Keys must be pre-validated by the caller: a slice
/// of the wrong length or with bits at or above `depth` is a contract
/// violation (debug-asserted, memory-safe regardless).
pub struct PhTree<V> {
    dims: usize,
    depth: u16,
    pub(crate) root: Option<Box<Node<V>>>,
    size: usize,
}

impl<V> PhTree<V> {
    /// An empty tree over `dims` dimensions of 64 bits each.
    pub fn new(dims: usize) -> Self {
        Self::with_depth(dims, 64)
    }

    /// An empty tree over `dims` dimensions of `depth` bits each.
    ///
    /// # Panics
    /// Panics when `dims` is zero or `depth` is outside `1..=64`.
    pub fn with_depth(dims: usize, depth: u16) -> Self {
        assert!(dims >= 1, "at least one dimension required");
        assert!((1..=64).contains(&depth), "depth must be in 1..=64");
        Self {
            dims,
            depth,
            root: None,
            size: 0,
        }
    }

    /// Number of dimensions.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Bits per dimension.
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the tree holds no points.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    fn check_key(&self, key: &[u64]) {
        debug_assert_eq!(key.len(), self.dims, "key dimensionality mismatch");
        debug_assert!(
            self.depth == 64 || key.iter().all(|&w| w >> self.depth == 0),
            "key exceeds the configured bit depth"
        );
    }

    /// Inserts `key -> value`, returning the previous value for `key`.
    pub fn put(&mut self, key: &[u64], value: V) -> Option<V> {
        self.check_key(key);
        let depth = self.depth;
        let root = self
            .root
            .get_or_insert_with(|| Box::new(Node::new(depth - 1)));
        let prev = root.put(key, value);
        if prev.is_none() {
            self.size += 1;
        }
        prev
    }

    /// The value stored at `key`, if any.
    pub fn get(&self, key: &[u64]) -> Option<&V> {
        self.check_key(key);
        self.root.as_ref()?.get(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &[u64]) -> bool {
        self.get(key).is_some()
    }

    /// Overwrites the value for an existing `key`, returning the prior
    /// value. Unlike [`put`](Self::put) this never inserts and never
    /// restructures the tree; an absent key reports `None`.
    pub fn replace(&mut self, key: &[u64], value: V) -> Option<V> {
        self.check_key(key);
        self.root.as_mut()?.replace(key, value)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &[u64]) -> Option<V> {
        self.check_key(key);
        let root = self.root.as_mut()?;
        let out = match root.remove(key, None) {
            RemoveOutcome::Removed(v) => Some(v),
            RemoveOutcome::NotFound => None,
            RemoveOutcome::Relocated | RemoveOutcome::Reinsert(_) => {
                unreachable!("no replacement key was supplied")
            }
        };
        if out.is_some() {
            self.size -= 1;
            if root.entry_count() == 0 {
                self.root = None;
            }
        }
        out
    }

    /// Moves the value at `old_key` to `new_key`. When both keys fall
    /// inside the owning node's postfix boundary the stored key is
    /// rewritten in place; otherwise the entry is removed and re-inserted
    /// from the root. Any existing value at `new_key` is overwritten.
    /// Returns `false` when `old_key` is absent.
    pub fn update_key(&mut self, old_key: &[u64], new_key: &[u64]) -> bool {
        self.check_key(old_key);
        self.check_key(new_key);
        let Some(root) = self.root.as_mut() else {
            return false;
        };
        match root.remove(old_key, Some(new_key)) {
            RemoveOutcome::NotFound => false,
            RemoveOutcome::Relocated => true,
            RemoveOutcome::Removed(_) => unreachable!("a replacement key was supplied"),
            RemoveOutcome::Reinsert(v) => {
                self.size -= 1;
                if root.entry_count() == 0 {
                    self.root = None;
                }
                self.put(new_key, v);
                true
            }
        }
    }

    /// All points inside the axis-aligned box `[min, max]`, bounds
    /// inclusive per dimension. An inverted box yields nothing.
    pub fn query(&self, min: &[u64], max: &[u64]) -> Vec<(&[u64], &V)> {
        self.check_key(min);
        self.check_key(max);
        let mut out = Vec::new();
        if min.iter().zip(max).any(|(lo, hi)| lo > hi) {
            return out;
        }
        if let Some(root) = &self.root {
            root.query_into(min, max, &mut out);
        }
        out
    }

    /// Depth-first iteration over all `(key, value)` pairs, in hypercube
    /// position order within each node.
    pub fn iter(&self) -> Iter<'_, V> {
        let mut stack = Vec::new();
        if let Some(root) = &self.root {
            stack.push(root.store.iter());
        }
        Iter { stack }
    }
}

/// Iterator over the entries of a [`PhTree`].
pub struct Iter<'a, V> {
    stack: Vec<btree_map::Iter<'a, HcPos, Entry<V>>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u64], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some((_, entry)) => match &entry.payload {
                    Payload::Child(sub) => self.stack.push(sub.store.iter()),
                    Payload::Value(v) => return Some((entry.key.as_slice(), v)),
                },
            }
        }
    }
}
