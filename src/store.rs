//! Ordered, position-keyed storage backing a node's children and values.
//!
//! The store is an associative container from hypercube position to entry,
//! built on a balanced sorted map: lookup, insertion and removal are all
//! logarithmic in the entry count, and iteration yields entries in position
//! order. It never decides conflict policy itself; the node branches over
//! the collision state through [`Slot`] and [`RemoveOp`].

use std::collections::btree_map::{self, BTreeMap};

use smallvec::SmallVec;

use crate::bits::HcPos;
use crate::node::Node;

/// A point key: one word per dimension.
pub type KdKey = SmallVec<[u64; 4]>;

/// What an entry carries: an opaque value, or a child node owned outright.
/// Never both.
pub enum Payload<V> {
    Value(V),
    Child(Box<Node<V>>),
}

/// One entry of a node: the full key of a point (or of some point below a
/// child node) plus its payload. The entry's position is never stored; it
/// is always recomputed from the key, so position and key cannot disagree.
pub struct Entry<V> {
    pub key: KdKey,
    pub payload: Payload<V>,
}

impl<V> Entry<V> {
    pub fn value(key: &[u64], value: V) -> Self {
        Self {
            key: KdKey::from_slice(key),
            payload: Payload::Value(value),
        }
    }

    pub fn child(key: KdKey, node: Box<Node<V>>) -> Self {
        Self {
            key,
            payload: Payload::Child(node),
        }
    }
}

/// Decision returned by the [`EntryStore::remove_with`] predicate.
pub enum RemoveOp<R> {
    /// Physically delete the entry; the store hands it back.
    Remove,
    /// Keep the entry, possibly mutated in place, and report `R`.
    Keep(R),
    /// Keep the entry untouched and report nothing.
    Ignore,
}

/// What [`EntryStore::remove_with`] did.
pub enum Removal<V, R> {
    Removed(Entry<V>),
    Kept(R),
    Untouched,
}

/// A probe result for one position: either free or already occupied.
/// Obtained once per operation so the node never looks a position up twice.
pub enum Slot<'a, V> {
    Vacant(VacantSlot<'a, V>),
    Occupied(OccupiedSlot<'a, V>),
}

pub struct VacantSlot<'a, V>(btree_map::VacantEntry<'a, HcPos, Entry<V>>);

impl<'a, V> VacantSlot<'a, V> {
    pub fn insert(self, entry: Entry<V>) -> &'a mut Entry<V> {
        self.0.insert(entry)
    }
}

pub struct OccupiedSlot<'a, V>(btree_map::OccupiedEntry<'a, HcPos, Entry<V>>);

impl<'a, V> OccupiedSlot<'a, V> {
    pub fn get(&self) -> &Entry<V> {
        self.0.get()
    }

    pub fn into_mut(self) -> &'a mut Entry<V> {
        self.0.into_mut()
    }

    pub fn remove_entry(self) -> (HcPos, Entry<V>) {
        self.0.remove_entry()
    }
}

/// The node-local entry store.
pub struct EntryStore<V> {
    entries: BTreeMap<HcPos, Entry<V>>,
}

impl<V> EntryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, pos: &HcPos) -> Option<&Entry<V>> {
        self.entries.get(pos)
    }

    pub fn get_mut(&mut self, pos: &HcPos) -> Option<&mut Entry<V>> {
        self.entries.get_mut(pos)
    }

    /// Probes `pos` once, for insert-or-resolve in a single traversal.
    pub fn slot(&mut self, pos: HcPos) -> Slot<'_, V> {
        match self.entries.entry(pos) {
            btree_map::Entry::Vacant(v) => Slot::Vacant(VacantSlot(v)),
            btree_map::Entry::Occupied(o) => Slot::Occupied(OccupiedSlot(o)),
        }
    }

    pub fn insert(&mut self, pos: HcPos, entry: Entry<V>) -> Option<Entry<V>> {
        self.entries.insert(pos, entry)
    }

    /// Removal protocol: `decide` inspects (and may mutate) the entry at
    /// `pos`. The entry is physically deleted only on [`RemoveOp::Remove`],
    /// in which case it is handed back whole.
    pub fn remove_with<R>(
        &mut self,
        pos: &HcPos,
        decide: impl FnOnce(&mut Entry<V>) -> RemoveOp<R>,
    ) -> Removal<V, R> {
        let btree_map::Entry::Occupied(mut occ) = self.entries.entry(pos.clone()) else {
            return Removal::Untouched;
        };
        match decide(occ.get_mut()) {
            RemoveOp::Remove => Removal::Removed(occ.remove()),
            RemoveOp::Keep(r) => Removal::Kept(r),
            RemoveOp::Ignore => Removal::Untouched,
        }
    }

    /// Removes and returns the entry at the lowest position.
    pub fn pop_first(&mut self) -> Option<(HcPos, Entry<V>)> {
        self.entries.pop_first()
    }

    /// The entry at the lowest position.
    pub fn first(&self) -> Option<&Entry<V>> {
        self.entries.first_key_value().map(|(_, e)| e)
    }

    /// Entries in position order.
    pub fn iter(&self) -> btree_map::Iter<'_, HcPos, Entry<V>> {
        self.entries.iter()
    }

    /// Entries whose position lies in `[lo, hi]`, in position order.
    pub fn range(&self, lo: HcPos, hi: HcPos) -> btree_map::Range<'_, HcPos, Entry<V>> {
        self.entries.range(lo..=hi)
    }
}
