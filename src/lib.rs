//! # phtree-rs
//!
//! A PH-tree: a trie over the bit-interleaved coordinates of
//! multi-dimensional integer points.
//!
//! Based on "The PH-Tree: A Space-Efficient Storage Structure and
//! Multi-Dimensional Index" (SIGMOD 2014, Zäschke et al.)
//!
//! Each node discriminates on one bit level of every dimension at once;
//! the concatenation of those bits forms a hypercube position addressing
//! up to `2^dims` slots. Nodes are created lazily on key collisions, so
//! the tree never holds a node with fewer than two entries below the root.
//!
//! ## Example
//!
//! ```rust
//! use phtree_rs::PhTree;
//!
//! let mut tree: PhTree<u64> = PhTree::new(2);
//! tree.put(&[1, 2], 10);
//! tree.put(&[1, 3], 11);
//!
//! assert_eq!(tree.get(&[1, 2]), Some(&10));
//! assert_eq!(tree.query(&[0, 0], &[8, 8]).len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
mod node;
mod store;
mod tree;

pub use tree::{Iter, PhTree};

#[cfg(test)]
mod proptests;
