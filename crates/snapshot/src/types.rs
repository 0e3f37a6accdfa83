use ethereum_types::H256;
use snapex_trie::{Nibbles, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Branch,
    Extension,
    Leaf,
}

impl NodeKind {
    pub fn of(node: &Node) -> Self {
        match node {
            Node::Branch(_) => NodeKind::Branch,
            Node::Extension(_) => NodeKind::Extension,
            Node::Leaf(_) => NodeKind::Leaf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Branch => "branch",
            NodeKind::Extension => "extension",
            NodeKind::Leaf => "leaf",
        }
    }
}

/// One visited node of the state trie, built transiently per visit and
/// handed to the publisher; the core keeps no global node set.
#[derive(Debug, Clone)]
pub struct StateNode {
    /// Position of the node: nibble path from the state root.
    pub path: Nibbles,
    pub kind: NodeKind,
    /// Raw RLP encoding as read from the chain store.
    pub encoded: Vec<u8>,
    /// keccak-256 of `encoded`.
    pub hash: H256,
    /// For leaves, the full 64-nibble account key (`path` plus the leaf's
    /// key fragment).
    pub leaf_key: Option<Nibbles>,
}

/// One visited node of a contract's storage trie.
#[derive(Debug, Clone)]
pub struct StorageNode {
    /// Full 64-nibble leaf path of the account owning the storage trie.
    pub account_path: Nibbles,
    /// Position within the storage trie.
    pub path: Nibbles,
    pub kind: NodeKind,
    pub encoded: Vec<u8>,
    pub hash: H256,
    /// For leaves, the full 64-nibble storage slot key.
    pub leaf_key: Option<Nibbles>,
}
