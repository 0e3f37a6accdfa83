use ethereum_types::H256;
use keccak_hash::keccak;
use rlp::Rlp;

use crate::{Nibbles, TrieError};

/// Reference to a child node inside an encoded parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// Empty slot.
    Empty,
    /// Child stored in the database under the keccak of its encoding.
    Hash(H256),
    /// Child shorter than 32 bytes, embedded verbatim in the parent.
    /// Resolving it is a decode, not a database lookup.
    Inline(Vec<u8>),
}

impl NodeRef {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }
}

impl From<H256> for NodeRef {
    fn from(hash: H256) -> Self {
        NodeRef::Hash(hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    pub choices: [NodeRef; 16],
    /// Value stored at the branch itself; empty for state/storage tries,
    /// where all keys share the same length.
    pub value: Vec<u8>,
}

impl BranchNode {
    /// Non-empty children in nibble order.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = (u8, &NodeRef)> {
        self.choices
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.is_empty())
            .map(|(i, child)| (i as u8, child))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: Vec<u8>,
}

/// A decoded node of an Ethereum Merkle Patricia Trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl Node {
    /// Decodes a node from its RLP encoding. Two-item lists are leaves or
    /// extensions depending on the hex-prefix flag of the first item;
    /// seventeen-item lists are branches.
    pub fn decode(encoded: &[u8]) -> Result<Node, TrieError> {
        let rlp = Rlp::new(encoded);
        match rlp.item_count()? {
            2 => {
                let (partial, is_leaf) = Nibbles::decode_compact(rlp.at(0)?.data()?)?;
                if is_leaf {
                    Ok(Node::Leaf(LeafNode {
                        partial,
                        value: rlp.at(1)?.data()?.to_vec(),
                    }))
                } else {
                    Ok(Node::Extension(ExtensionNode {
                        prefix: partial,
                        child: decode_child(&rlp.at(1)?)?,
                    }))
                }
            }
            17 => {
                let mut choices: [NodeRef; 16] = std::array::from_fn(|_| NodeRef::Empty);
                for (i, choice) in choices.iter_mut().enumerate() {
                    *choice = decode_child(&rlp.at(i)?)?;
                }
                Ok(Node::Branch(Box::new(BranchNode {
                    choices,
                    value: rlp.at(16)?.data()?.to_vec(),
                })))
            }
            n => Err(TrieError::InvalidNode(n)),
        }
    }

    /// keccak-256 of the node encoding.
    pub fn hash_of(encoded: &[u8]) -> H256 {
        keccak(encoded)
    }
}

fn decode_child(item: &Rlp) -> Result<NodeRef, TrieError> {
    if item.is_list() {
        // An embedded short node; keep its raw encoding for later decoding.
        return Ok(NodeRef::Inline(item.as_raw().to_vec()));
    }
    let data = item.data()?;
    match data.len() {
        0 => Ok(NodeRef::Empty),
        32 => Ok(NodeRef::Hash(H256::from_slice(data))),
        n => Err(TrieError::InvalidChildRef(n)),
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        NodeRef::Empty
    }
}
