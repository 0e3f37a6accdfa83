use ethereum_types::H256;
use keccak_hash::keccak;
use rlp::RlpStream;

use crate::{EMPTY_TRIE_ROOT, Nibbles};

/// Insert-only Merkle Patricia Trie builder.
///
/// Collects key/value pairs in memory and, on [`TrieBuilder::build`],
/// produces the full encoded node set together with each node's position
/// path. Callers seed a chain store from the hashed nodes; test fixtures
/// additionally use the path-annotated set as the expected traversal output.
#[derive(Default)]
pub struct TrieBuilder {
    root: Option<BuildNode>,
}

/// One encoded node of a built trie.
#[derive(Debug, Clone)]
pub struct BuiltNode {
    /// Position of the node: the nibble path from the root to it.
    pub path: Nibbles,
    pub encoded: Vec<u8>,
    /// keccak-256 of `encoded`.
    pub hash: H256,
    /// True when the node is embedded in its parent instead of being stored
    /// under its hash. The root is never inline.
    pub inline: bool,
}

#[derive(Debug)]
pub struct BuiltTrie {
    pub root: H256,
    /// Every node of the trie, in post-order.
    pub nodes: Vec<BuiltNode>,
}

impl BuiltTrie {
    /// The nodes a hash-keyed store has to hold: everything not embedded in
    /// a parent.
    pub fn hashed_nodes(&self) -> impl Iterator<Item = (&H256, &[u8])> {
        self.nodes
            .iter()
            .filter(|n| !n.inline)
            .map(|n| (&n.hash, n.encoded.as_slice()))
    }
}

impl TrieBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`. The key is split into nibbles; callers
    /// producing state or storage tries pass the 32-byte keccak of the
    /// address or slot. Re-inserting a key replaces its value.
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) {
        let path = Nibbles::from_bytes(key);
        self.root = Some(insert(self.root.take(), path.as_slice(), value));
    }

    /// Encodes the trie bottom-up and returns the node set plus root hash.
    pub fn build(self) -> BuiltTrie {
        let mut nodes = Vec::new();
        let Some(root) = self.root else {
            return BuiltTrie {
                root: EMPTY_TRIE_ROOT,
                nodes,
            };
        };
        let encoded = encode(&root, Nibbles::new(), &mut nodes);
        let root_hash = keccak(&encoded);
        if let Some(last) = nodes.last_mut() {
            // The root is referenced by hash no matter how short it encodes.
            last.inline = false;
        }
        BuiltTrie {
            root: root_hash,
            nodes,
        }
    }
}

enum BuildNode {
    Branch {
        children: Box<[Option<BuildNode>; 16]>,
        value: Vec<u8>,
    },
    Extension {
        prefix: Nibbles,
        child: Box<BuildNode>,
    },
    Leaf {
        partial: Nibbles,
        value: Vec<u8>,
    },
}

fn leaf(partial: &[u8], value: Vec<u8>) -> BuildNode {
    BuildNode::Leaf {
        partial: Nibbles::from_vec_unchecked(partial.to_vec()),
        value,
    }
}

fn empty_children() -> Box<[Option<BuildNode>; 16]> {
    Box::new(std::array::from_fn(|_| None))
}

fn common_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Wraps `branch` in an extension when the shared prefix is non-empty.
fn wrap_extension(prefix: &[u8], branch: BuildNode) -> BuildNode {
    if prefix.is_empty() {
        branch
    } else {
        BuildNode::Extension {
            prefix: Nibbles::from_vec_unchecked(prefix.to_vec()),
            child: Box::new(branch),
        }
    }
}

fn insert(node: Option<BuildNode>, path: &[u8], value: Vec<u8>) -> BuildNode {
    match node {
        None => leaf(path, value),
        Some(BuildNode::Leaf {
            partial,
            value: old_value,
        }) => {
            let old = partial.as_slice();
            let common = common_len(old, path);
            if common == old.len() && common == path.len() {
                return BuildNode::Leaf { partial, value };
            }
            // Keys diverge: split into a branch, keeping the shared prefix
            // in an extension.
            let mut children = empty_children();
            let mut branch_value = Vec::new();
            if common == old.len() {
                branch_value = old_value;
            } else {
                children[old[common] as usize] = Some(leaf(&old[common + 1..], old_value));
            }
            if common == path.len() {
                branch_value = value;
            } else {
                children[path[common] as usize] = Some(leaf(&path[common + 1..], value));
            }
            wrap_extension(
                &path[..common],
                BuildNode::Branch {
                    children,
                    value: branch_value,
                },
            )
        }
        Some(BuildNode::Extension { prefix, child }) => {
            let pre = prefix.as_slice();
            let common = common_len(pre, path);
            if common == pre.len() {
                let child = insert(Some(*child), &path[common..], value);
                return BuildNode::Extension {
                    prefix,
                    child: Box::new(child),
                };
            }
            // The new key leaves the extension early: cut it at the
            // divergence point.
            let mut children = empty_children();
            let mut branch_value = Vec::new();
            let existing = if common + 1 == pre.len() {
                *child
            } else {
                BuildNode::Extension {
                    prefix: Nibbles::from_vec_unchecked(pre[common + 1..].to_vec()),
                    child,
                }
            };
            children[pre[common] as usize] = Some(existing);
            if common == path.len() {
                branch_value = value;
            } else {
                children[path[common] as usize] = Some(leaf(&path[common + 1..], value));
            }
            wrap_extension(
                &path[..common],
                BuildNode::Branch {
                    children,
                    value: branch_value,
                },
            )
        }
        Some(BuildNode::Branch {
            mut children,
            value: branch_value,
        }) => {
            if path.is_empty() {
                return BuildNode::Branch {
                    children,
                    value,
                };
            }
            let idx = path[0] as usize;
            children[idx] = Some(insert(children[idx].take(), &path[1..], value));
            BuildNode::Branch {
                children,
                value: branch_value,
            }
        }
    }
}

/// Post-order encoding: children first so the parent can embed or reference
/// them by hash. Records every node with its position path.
fn encode(node: &BuildNode, path: Nibbles, nodes: &mut Vec<BuiltNode>) -> Vec<u8> {
    let encoded = match node {
        BuildNode::Leaf { partial, value } => {
            let mut s = RlpStream::new_list(2);
            s.append(&partial.encode_compact(true));
            s.append(value);
            s.out().to_vec()
        }
        BuildNode::Extension { prefix, child } => {
            let child_rlp = encode(child, path.concat(prefix), nodes);
            let mut s = RlpStream::new_list(2);
            s.append(&prefix.encode_compact(false));
            append_child(&mut s, &child_rlp);
            s.out().to_vec()
        }
        BuildNode::Branch { children, value } => {
            let mut s = RlpStream::new_list(17);
            for (i, child) in children.iter().enumerate() {
                match child {
                    None => {
                        s.append_empty_data();
                    }
                    Some(child) => {
                        let child_rlp = encode(child, path.append_new(i as u8), nodes);
                        append_child(&mut s, &child_rlp);
                    }
                }
            }
            s.append(value);
            s.out().to_vec()
        }
    };
    nodes.push(BuiltNode {
        path,
        hash: keccak(&encoded),
        inline: encoded.len() < 32,
        encoded: encoded.clone(),
    });
    encoded
}

fn append_child(s: &mut RlpStream, child_rlp: &[u8]) {
    if child_rlp.len() < 32 {
        s.append_raw(child_rlp, 1);
    } else {
        s.append(&keccak(child_rlp));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Node, NodeRef};
    use std::collections::HashMap;

    fn node_map(trie: &BuiltTrie) -> HashMap<H256, Vec<u8>> {
        trie.hashed_nodes()
            .map(|(h, rlp)| (*h, rlp.to_vec()))
            .collect()
    }

    fn resolve(nodes: &HashMap<H256, Vec<u8>>, child: &NodeRef) -> Option<Vec<u8>> {
        match child {
            NodeRef::Empty => None,
            NodeRef::Hash(h) => nodes.get(h).cloned(),
            NodeRef::Inline(raw) => Some(raw.clone()),
        }
    }

    /// Key lookup over the encoded node set, decoding with [`Node`] so the
    /// builder output and the decoder check each other.
    fn lookup(nodes: &HashMap<H256, Vec<u8>>, root: H256, key: &[u8]) -> Option<Vec<u8>> {
        let path = Nibbles::from_bytes(key);
        let mut current = nodes.get(&root)?.clone();
        let mut offset = 0usize;
        loop {
            match Node::decode(&current).unwrap() {
                Node::Leaf(leaf) => {
                    return (leaf.partial.as_slice() == &path.as_slice()[offset..])
                        .then_some(leaf.value);
                }
                Node::Extension(ext) => {
                    let rest = &path.as_slice()[offset..];
                    if rest.len() < ext.prefix.len()
                        || &rest[..ext.prefix.len()] != ext.prefix.as_slice()
                    {
                        return None;
                    }
                    offset += ext.prefix.len();
                    current = resolve(nodes, &ext.child)?;
                }
                Node::Branch(branch) => {
                    if offset == path.len() {
                        return (!branch.value.is_empty()).then_some(branch.value);
                    }
                    let choice = path.at(offset) as usize;
                    offset += 1;
                    current = resolve(nodes, &branch.choices[choice])?;
                }
            }
        }
    }

    #[test]
    fn empty_trie() {
        let trie = TrieBuilder::new().build();
        assert_eq!(trie.root, EMPTY_TRIE_ROOT);
        assert!(trie.nodes.is_empty());
    }

    #[test]
    fn single_leaf_sits_at_the_root_path() {
        let mut builder = TrieBuilder::new();
        builder.insert(b"key", b"value".to_vec());
        let trie = builder.build();
        assert_eq!(trie.nodes.len(), 1);
        assert_eq!(trie.nodes[0].path, Nibbles::new());
        assert_eq!(trie.nodes[0].hash, trie.root);
        assert!(!trie.nodes[0].inline);
    }

    #[test]
    fn known_root_vector() {
        // Insert vector from the classic go-ethereum trie tests.
        let mut builder = TrieBuilder::new();
        builder.insert(b"doe", b"reindeer".to_vec());
        builder.insert(b"dog", b"puppy".to_vec());
        builder.insert(b"dogglesworth", b"cat".to_vec());
        let trie = builder.build();
        let expected: H256 =
            "8aad789dff2f538bca5d8ea56e8abe10f4c7ba3a5dea95fea4cd6e7c3a1168d3"
                .parse()
                .unwrap();
        assert_eq!(trie.root, expected);
    }

    #[test]
    fn shared_prefix_produces_extension_then_branch() {
        let mut builder = TrieBuilder::new();
        builder.insert(b"doe", b"reindeer".to_vec());
        builder.insert(b"dog", b"puppy".to_vec());
        let trie = builder.build();

        // "doe"/"dog" share the nibbles [6,4,6,f,6]; the root extension
        // keeps them, the branch below diverges on 5 vs 7.
        let paths: Vec<_> = trie.nodes.iter().map(|n| n.path.clone()).collect();
        assert!(paths.contains(&Nibbles::new()));
        assert!(paths.contains(&Nibbles::from_nibbles(&[6, 4, 6, 0xf, 6]).unwrap()));
        assert!(paths.contains(&Nibbles::from_nibbles(&[6, 4, 6, 0xf, 6, 5]).unwrap()));
        assert!(paths.contains(&Nibbles::from_nibbles(&[6, 4, 6, 0xf, 6, 7]).unwrap()));
    }

    #[test]
    fn lookup_every_inserted_key() {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0u32..60)
            .map(|i| {
                let key = keccak(i.to_be_bytes()).as_bytes().to_vec();
                let value = rlp::encode(&(u64::from(i) * 31)).to_vec();
                (key, value)
            })
            .collect();

        let mut builder = TrieBuilder::new();
        for (key, value) in &entries {
            builder.insert(key, value.clone());
        }
        let trie = builder.build();
        let nodes = node_map(&trie);

        for (key, value) in &entries {
            assert_eq!(lookup(&nodes, trie.root, key).as_ref(), Some(value));
        }
        assert_eq!(lookup(&nodes, trie.root, &[0u8; 32]), None);
    }

    #[test]
    fn replacing_a_value_changes_the_root() {
        let mut builder = TrieBuilder::new();
        builder.insert(b"k1", b"a".to_vec());
        builder.insert(b"k2", b"b".to_vec());
        let first = builder.build();

        let mut builder = TrieBuilder::new();
        builder.insert(b"k1", b"a".to_vec());
        builder.insert(b"k2", b"b".to_vec());
        builder.insert(b"k2", b"c".to_vec());
        let second = builder.build();

        assert_ne!(first.root, second.root);
        assert_eq!(
            first.nodes.len(),
            second.nodes.len(),
            "replacement must not add nodes"
        );
    }

    #[test]
    fn every_hash_matches_its_encoding() {
        let mut builder = TrieBuilder::new();
        for i in 0u8..20 {
            builder.insert(keccak([i]).as_bytes(), vec![i + 1; 40]);
        }
        let trie = builder.build();
        for node in &trie.nodes {
            assert_eq!(node.hash, keccak(&node.encoded));
        }
    }
}
