use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

use crate::bits;
use crate::node::Node;
use crate::store::Payload;

const DIMS: usize = 3;

/// Walks the whole tree checking structural invariants, returning the
/// number of stored values.
fn validate_node<V>(node: &Node<V>, is_root: bool, parent_post_len: Option<u16>) -> usize {
    let n = node.entry_count();
    if is_root {
        assert!(n >= 1, "non-empty root must hold an entry");
    } else {
        assert!(n >= 2, "inner node underflow: {n} entries");
    }
    if let Some(parent) = parent_post_len {
        assert!(
            node.post_len < parent,
            "child post_len {} must sit below parent {}",
            node.post_len,
            parent
        );
    }

    let mut values = 0usize;
    for (pos, entry) in node.store.iter() {
        assert_eq!(
            pos,
            &bits::pos_of(&entry.key, node.post_len),
            "stored position must match the entry key at this node's depth"
        );
        match &entry.payload {
            Payload::Value(_) => values += 1,
            Payload::Child(sub) => {
                values += validate_node(sub, false, Some(node.post_len));
            }
        }
    }
    values
}

fn validate_tree<V>(t: &PhTree<V>) {
    let values = match &t.root {
        None => 0,
        Some(root) => validate_node(root, true, None),
    };
    assert_eq!(values, t.len(), "stored value count must match len()");
}

#[derive(Debug, Clone)]
enum Op {
    Put(Vec<u64>, u64),
    Remove(Vec<u64>),
    Get(Vec<u64>),
    Move(Vec<u64>, Vec<u64>),
}

fn key_strategy() -> impl Strategy<Value = Vec<u64>> {
    // Small coordinates collide often, forcing deep splits and merges.
    prop::collection::vec(0u64..32, DIMS)
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (key_strategy(), any::<u64>()).prop_map(|(k, v)| Op::Put(k, v)),
            2 => key_strategy().prop_map(Op::Remove),
            1 => key_strategy().prop_map(Op::Get),
            1 => (key_strategy(), key_strategy()).prop_map(|(a, b)| Op::Move(a, b)),
        ],
        0..400,
    )
}

proptest! {
    #[test]
    fn matches_btreemap_model(ops in ops_strategy()) {
        let mut t: PhTree<u64> = PhTree::new(DIMS);
        let mut m: BTreeMap<Vec<u64>, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    prop_assert_eq!(t.put(&k, v), m.insert(k, v));
                }
                Op::Remove(k) => {
                    prop_assert_eq!(t.remove(&k), m.remove(&k));
                }
                Op::Get(k) => {
                    prop_assert_eq!(t.get(&k), m.get(&k));
                }
                Op::Move(a, b) => {
                    let moved = t.update_key(&a, &b);
                    let model_moved = match m.remove(&a) {
                        Some(v) => {
                            m.insert(b, v);
                            true
                        }
                        None => false,
                    };
                    prop_assert_eq!(moved, model_moved);
                }
            }
            prop_assert_eq!(t.len(), m.len());
            validate_tree(&t);
        }

        let mut got: Vec<(Vec<u64>, u64)> = t.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
        got.sort();
        let expected: Vec<(Vec<u64>, u64)> = m.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn window_query_matches_linear_filter(
        keys in prop::collection::btree_set(key_strategy(), 0..200),
        lo in key_strategy(),
        hi in key_strategy(),
    ) {
        let mut t: PhTree<usize> = PhTree::new(DIMS);
        for (i, k) in keys.iter().enumerate() {
            t.put(k, i);
        }

        let mut got: Vec<Vec<u64>> = t.query(&lo, &hi).iter().map(|(k, _)| k.to_vec()).collect();
        got.sort();
        let mut expected: Vec<Vec<u64>> = keys
            .iter()
            .filter(|k| k.iter().zip(&lo).all(|(c, l)| c >= l) && k.iter().zip(&hi).all(|(c, h)| c <= h))
            .cloned()
            .collect();
        expected.sort();
        prop_assert_eq!(got, expected);
    }
}
