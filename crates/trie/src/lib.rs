//! Read-oriented Merkle Patricia Trie primitives.
//!
//! This crate covers the decoding side of the trie: nibble paths, typed
//! nodes and the hex-prefix codec, plus an insert-only [`TrieBuilder`] for
//! constructing tries node-set-first (seeding stores, test fixtures).
//! Mutation-in-place, proofs and range queries are out of scope.

mod account;
mod builder;
mod error;
mod nibbles;
mod node;

pub use account::{Account, EMPTY_TRIE_ROOT, KECCAK_EMPTY};
pub use builder::{BuiltNode, BuiltTrie, TrieBuilder};
pub use error::TrieError;
pub use nibbles::Nibbles;
pub use node::{BranchNode, ExtensionNode, LeafNode, Node, NodeRef};

/// RLP encoding of a trie node.
pub type NodeRLP = Vec<u8>;
/// RLP encoding of a leaf value.
pub type ValueRLP = Vec<u8>;
