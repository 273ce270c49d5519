//! A single trie node: one entry store plus the conflict, split and
//! relocation logic that grows and shrinks the tree.
//!
//! `post_len` is the number of low-order bits per dimension that are still
//! undiscriminated below this node; the node's own discriminating bit sits
//! at index `post_len` of every dimension word, and that slice is the
//! hypercube position an entry is stored under. `post_len` strictly
//! decreases from parent to child, which bounds every recursion here.

use std::mem;

use smallvec::smallvec;

use crate::bits::{self, HcPos};
use crate::store::{Entry, EntryStore, KdKey, Payload, Removal, RemoveOp, Slot};

/// Outcome of a node-level removal.
pub enum RemoveOutcome<V> {
    NotFound,
    Removed(V),
    /// Move fast-path: the stored key was rewritten in place, the value
    /// never left its entry.
    Relocated,
    /// The replacement key diverges above this node's postfix boundary;
    /// the entry was removed and the caller must re-insert the value.
    Reinsert(V),
}

pub struct Node<V> {
    pub(crate) post_len: u16,
    pub(crate) store: EntryStore<V>,
}

/// Per-dimension mask of the bits below a node's discriminating bit.
#[inline]
fn postfix_mask(post_len: u16) -> u64 {
    (1u64 << post_len) - 1
}

/// Per-dimension mask of the bits spanned between a node's discriminating
/// bit and a child node's, both exclusive.
#[inline]
fn infix_mask(post_len: u16, sub_post_len: u16) -> u64 {
    debug_assert!(sub_post_len < post_len);
    let mask = !(!0u64 << (post_len - sub_post_len - 1));
    mask << (sub_post_len + 1)
}

/// Highest set bit over all dimensions of `(a ^ b) & mask`, plus one.
/// Zero when the keys agree on every masked bit.
fn conflicting_bits(a: &[u64], b: &[u64], mask: u64) -> u32 {
    debug_assert_eq!(a.len(), b.len());
    let mut x = 0u64;
    for (wa, wb) in a.iter().zip(b) {
        x |= wa ^ wb;
    }
    x &= mask;
    64 - x.leading_zeros()
}

impl<V> Node<V> {
    pub fn new(post_len: u16) -> Self {
        Self {
            post_len,
            store: EntryStore::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.store.len()
    }

    /// Whether `entry` can stand in for `key` here: the stored key must
    /// agree with `key` on every bit this node still discriminates for the
    /// entry's kind. Bits above the node were settled by the ancestors.
    fn matches(entry: &Entry<V>, key: &[u64], post_len: u16) -> bool {
        let mask = match &entry.payload {
            Payload::Child(sub) => infix_mask(post_len, sub.post_len),
            Payload::Value(_) => postfix_mask(post_len),
        };
        entry.key.iter().zip(key).all(|(a, b)| (a ^ b) & mask == 0)
    }

    /// Inserts `key`, resolving position collisions by overwrite, descent
    /// or split. Returns the previous value when the key was present.
    pub fn put(&mut self, key: &[u64], value: V) -> Option<V> {
        let post_len = self.post_len;
        let pos = bits::pos_of(key, post_len);
        match self.store.slot(pos) {
            Slot::Vacant(slot) => {
                slot.insert(Entry::value(key, value));
                None
            }
            Slot::Occupied(slot) => {
                let existing = slot.get();
                let (mask, is_child) = match &existing.payload {
                    Payload::Child(sub) => (infix_mask(post_len, sub.post_len), true),
                    Payload::Value(_) => (postfix_mask(post_len), false),
                };
                let conflict = conflicting_bits(key, &existing.key, mask);
                if conflict != 0 {
                    // The keys disagree below this node: replace the entry
                    // with an intermediate node holding exactly both of
                    // them, partitioned at the highest conflicting bit.
                    let (pos, old) = slot.remove_entry();
                    let parent_key = old.key.clone();
                    let mut sub = Box::new(Node::new((conflict - 1) as u16));
                    sub.insert_initial(old);
                    sub.insert_initial(Entry::value(key, value));
                    self.store.insert(pos, Entry::child(parent_key, sub));
                    None
                } else if is_child {
                    // No divergence in the infix: retry one level down.
                    match &mut slot.into_mut().payload {
                        Payload::Child(sub) => sub.put(key, value),
                        Payload::Value(_) => unreachable!("entry kind changed mid-probe"),
                    }
                } else {
                    // Perfect match: overwrite the value.
                    let entry = slot.into_mut();
                    entry.key = KdKey::from_slice(key);
                    match &mut entry.payload {
                        Payload::Value(prev) => Some(mem::replace(prev, value)),
                        Payload::Child(_) => unreachable!("entry kind changed mid-probe"),
                    }
                }
            }
        }
    }

    /// Installs an entry into a freshly created node. The two entries a
    /// split produces always land on distinct positions.
    fn insert_initial(&mut self, entry: Entry<V>) {
        let pos = bits::pos_of(&entry.key, self.post_len);
        let prev = self.store.insert(pos, entry);
        debug_assert!(prev.is_none(), "split entries must not collide");
    }

    pub fn get(&self, key: &[u64]) -> Option<&V> {
        let pos = bits::pos_of(key, self.post_len);
        let entry = self.store.get(&pos)?;
        if !Self::matches(entry, key, self.post_len) {
            return None;
        }
        match &entry.payload {
            Payload::Child(sub) => sub.get(key),
            Payload::Value(v) => Some(v),
        }
    }

    /// Overwrites the value for `key` without any conflict handling,
    /// returning the prior value. Absent or mismatched keys report `None`
    /// and change nothing; no structural work is ever done here.
    pub fn replace(&mut self, key: &[u64], value: V) -> Option<V> {
        let post_len = self.post_len;
        let pos = bits::pos_of(key, post_len);
        let entry = self.store.get_mut(&pos)?;
        if !Self::matches(entry, key, post_len) {
            return None;
        }
        match &mut entry.payload {
            Payload::Child(sub) => sub.replace(key, value),
            Payload::Value(v) => Some(mem::replace(v, value)),
        }
    }

    /// Removes the value stored at `key`. With `new_key` given, this is
    /// the first half of a move: if old and new key diverge at or below
    /// this node's postfix boundary the stored key is rewritten in place
    /// and nothing is deleted; otherwise the entry comes out and the
    /// caller re-inserts it under the new key.
    pub fn remove(&mut self, key: &[u64], new_key: Option<&[u64]>) -> RemoveOutcome<V> {
        let post_len = self.post_len;
        let pos = bits::pos_of(key, post_len);
        let removal = self.store.remove_with(&pos, |entry| {
            if !Self::matches(entry, key, post_len) {
                return RemoveOp::Ignore;
            }
            match &mut entry.payload {
                Payload::Child(sub) => {
                    // Structural nodes are never deleted here: recurse,
                    // then absorb the child if it shrank to a lone entry.
                    let outcome = sub.remove(key, new_key);
                    let shrank = matches!(
                        outcome,
                        RemoveOutcome::Removed(_) | RemoveOutcome::Reinsert(_)
                    );
                    if shrank && sub.entry_count() == 1 {
                        *entry = sub.take_lone_entry();
                    }
                    RemoveOp::Keep(outcome)
                }
                Payload::Value(_) => {
                    if let Some(nk) = new_key {
                        let diff = conflicting_bits(key, nk, u64::MAX);
                        if diff <= u32::from(post_len) {
                            entry.key = KdKey::from_slice(nk);
                            return RemoveOp::Keep(RemoveOutcome::Relocated);
                        }
                    }
                    RemoveOp::Remove
                }
            }
        });
        match removal {
            Removal::Untouched => RemoveOutcome::NotFound,
            Removal::Kept(outcome) => outcome,
            Removal::Removed(entry) => match entry.payload {
                Payload::Value(v) => {
                    if new_key.is_some() {
                        RemoveOutcome::Reinsert(v)
                    } else {
                        RemoveOutcome::Removed(v)
                    }
                }
                Payload::Child(_) => unreachable!("only value entries are physically removed"),
            },
        }
    }

    /// Pulls out the last remaining entry so the parent can absorb it.
    fn take_lone_entry(&mut self) -> Entry<V> {
        debug_assert_eq!(self.store.len(), 1);
        match self.store.pop_first() {
            Some((_, entry)) => entry,
            None => unreachable!("lone entry vanished"),
        }
    }

    /// Collects every entry inside the axis-aligned box `[min, max]` into
    /// `out`.
    ///
    /// Position bounds for this node are derived from the box clamped to
    /// the node's prefix: a dimension whose box bound leaves the prefix is
    /// unconstrained at this depth. When the bounds leave only a few free
    /// bits, candidate positions are enumerated odometer-style and probed
    /// directly; otherwise the store range is scanned and filtered. Every
    /// surviving entry is then verified exactly before it is reported or
    /// descended into.
    pub fn query_into<'a>(&'a self, min: &[u64], max: &[u64], out: &mut Vec<(&'a [u64], &'a V)>) {
        let Some(first) = self.store.first() else {
            return;
        };
        let prefix = &first.key;
        let dims = min.len();
        let post_len = self.post_len;
        // Bits strictly above this node's discriminating bit.
        let above = if post_len >= 63 {
            0
        } else {
            !0u64 << (post_len + 1)
        };
        let nw = bits::num_pos_words(dims);
        let mut lo: HcPos = smallvec![0; nw];
        let mut hi: HcPos = smallvec![0; nw];
        for d in 0..dims {
            let p = dims - 1 - d;
            let (w, b) = (nw - 1 - p / 64, p % 64);
            if (min[d] & above) == (prefix[d] & above) && (min[d] >> post_len) & 1 != 0 {
                lo[w] |= 1u64 << b;
            }
            if (max[d] & above) != (prefix[d] & above) || (max[d] >> post_len) & 1 != 0 {
                hi[w] |= 1u64 << b;
            }
        }

        let free: u32 = lo.iter().zip(hi.iter()).map(|(l, h)| (h & !l).count_ones()).sum();
        if free < 10 && (1usize << free) < self.store.len() {
            let mut val = lo.clone();
            loop {
                if let Some(entry) = self.store.get(&val) {
                    Self::visit_entry(entry, min, max, out);
                }
                if !bits::inc_bounded(&mut val, &lo, &hi) {
                    break;
                }
            }
        } else {
            for (pos, entry) in self.store.range(lo.clone(), hi.clone()) {
                let candidate = pos
                    .iter()
                    .zip(lo.iter().zip(hi.iter()))
                    .all(|(p, (l, h))| p & !h == 0 && p & l == *l);
                if candidate {
                    Self::visit_entry(entry, min, max, out);
                }
            }
        }
    }

    fn visit_entry<'a>(
        entry: &'a Entry<V>,
        min: &[u64],
        max: &[u64],
        out: &mut Vec<(&'a [u64], &'a V)>,
    ) {
        match &entry.payload {
            Payload::Value(v) => {
                let inside = entry
                    .key
                    .iter()
                    .zip(min.iter().zip(max))
                    .all(|(k, (lo, hi))| lo <= k && k <= hi);
                if inside {
                    out.push((entry.key.as_slice(), v));
                }
            }
            Payload::Child(sub) => {
                // Region spanned by the subtree: the stored key with all
                // bits at or below the child's discriminating bit freed.
                let pm = (2u64 << sub.post_len) - 1;
                let overlaps = entry
                    .key
                    .iter()
                    .zip(min.iter().zip(max))
                    .all(|(k, (lo, hi))| (k & !pm) <= *hi && (k | pm) >= *lo);
                if overlaps {
                    sub.query_into(min, max, out);
                }
            }
        }
    }
}
