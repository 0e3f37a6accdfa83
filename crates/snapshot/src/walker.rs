use std::sync::atomic::{AtomicBool, Ordering};

use ethereum_types::H256;
use keccak_hash::keccak;
use snapex_chaindb::ChainStore;
use snapex_trie::{Account, Nibbles, Node, NodeRef, TrieError};

use crate::filter::AddressFilter;
use crate::partition::SubtreeJob;
use crate::publish::PublisherTx;
use crate::types::{NodeKind, StateNode, StorageNode};
use crate::SnapshotError;

/// Everything a worker needs while walking one subtree.
pub(crate) struct WorkerCtx<'a, T: PublisherTx> {
    pub store: &'a dyn ChainStore,
    pub tx: &'a mut T,
    pub header_hash: H256,
    pub header_number: u64,
    pub filter: Option<&'a AddressFilter>,
    pub cancel: &'a AtomicBool,
}

/// Fetches and decodes the node behind a reference. Inline children decode
/// in place without touching the store.
pub(crate) fn resolve_node(
    store: &dyn ChainStore,
    node_ref: &NodeRef,
) -> Result<(Vec<u8>, H256, Node), SnapshotError> {
    match node_ref {
        NodeRef::Hash(hash) => {
            let encoded = store.trie_node(*hash)?;
            let node = Node::decode(&encoded)?;
            Ok((encoded, *hash, node))
        }
        NodeRef::Inline(encoded) => {
            let node = Node::decode(encoded)?;
            Ok((encoded.clone(), keccak(encoded), node))
        }
        NodeRef::Empty => Err(SnapshotError::EmptyNodeRef),
    }
}

/// Depth-first walk of one state subtree.
///
/// Nodes are published in pre-order with branch children visited in nibble
/// order; contract leaves pull in their code and their full storage trie
/// before the walk continues. The cancellation flag is polled once per node.
pub(crate) fn walk_subtree<T: PublisherTx>(
    ctx: &mut WorkerCtx<'_, T>,
    job: &SubtreeJob,
) -> Result<(), SnapshotError> {
    let mut stack: Vec<(Nibbles, NodeRef)> = vec![(job.prefix.clone(), job.root.clone())];

    while let Some((path, node_ref)) = stack.pop() {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(SnapshotError::Cancelled);
        }
        if let Some(filter) = ctx.filter {
            // Nothing watched lives below this position.
            if !filter.allows(&path) {
                continue;
            }
        }
        let (encoded, hash, node) = resolve_node(ctx.store, &node_ref)?;
        match &node {
            Node::Leaf(leaf) => {
                let leaf_key = path.concat(&leaf.partial);
                if let Some(filter) = ctx.filter {
                    if !filter.matches_leaf(&leaf_key) {
                        continue;
                    }
                }
                ctx.tx.publish_state_node(
                    &StateNode {
                        path: path.clone(),
                        kind: NodeKind::Leaf,
                        encoded,
                        hash,
                        leaf_key: Some(leaf_key.clone()),
                    },
                    ctx.header_hash,
                    ctx.header_number,
                )?;
                let account =
                    Account::decode(&leaf.value).map_err(TrieError::RlpDecode)?;
                if account.is_contract() {
                    let code = ctx.store.code(account.code_hash)?;
                    ctx.tx
                        .publish_code(ctx.header_number, account.code_hash, &code)?;
                }
                if account.has_storage() {
                    walk_storage(ctx, &leaf_key, account.storage_root)?;
                }
            }
            Node::Branch(branch) => {
                ctx.tx.publish_state_node(
                    &StateNode {
                        path: path.clone(),
                        kind: NodeKind::Branch,
                        encoded,
                        hash,
                        leaf_key: None,
                    },
                    ctx.header_hash,
                    ctx.header_number,
                )?;
                // Reverse push order so children pop in nibble order 0..15.
                for (choice, child) in branch.children().rev() {
                    stack.push((path.append_new(choice), child.clone()));
                }
            }
            Node::Extension(ext) => {
                ctx.tx.publish_state_node(
                    &StateNode {
                        path: path.clone(),
                        kind: NodeKind::Extension,
                        encoded,
                        hash,
                        leaf_key: None,
                    },
                    ctx.header_hash,
                    ctx.header_number,
                )?;
                stack.push((path.concat(&ext.prefix), ext.child.clone()));
            }
        }
    }
    Ok(())
}

/// Full walk of a contract's storage trie. Never filtered: a watched
/// account's storage is published wholesale, zero-valued slots included.
fn walk_storage<T: PublisherTx>(
    ctx: &mut WorkerCtx<'_, T>,
    account_path: &Nibbles,
    storage_root: H256,
) -> Result<(), SnapshotError> {
    let mut stack: Vec<(Nibbles, NodeRef)> = vec![(Nibbles::new(), NodeRef::Hash(storage_root))];

    while let Some((path, node_ref)) = stack.pop() {
        if ctx.cancel.load(Ordering::Relaxed) {
            return Err(SnapshotError::Cancelled);
        }
        let (encoded, hash, node) = resolve_node(ctx.store, &node_ref)?;
        let (kind, leaf_key) = match &node {
            Node::Leaf(leaf) => (NodeKind::Leaf, Some(path.concat(&leaf.partial))),
            Node::Branch(_) => (NodeKind::Branch, None),
            Node::Extension(_) => (NodeKind::Extension, None),
        };
        ctx.tx.publish_storage_node(
            &StorageNode {
                account_path: account_path.clone(),
                path: path.clone(),
                kind,
                encoded,
                hash,
                leaf_key,
            },
            ctx.header_hash,
            ctx.header_number,
        )?;
        match &node {
            Node::Branch(branch) => {
                for (choice, child) in branch.children().rev() {
                    stack.push((path.append_new(choice), child.clone()));
                }
            }
            Node::Extension(ext) => {
                stack.push((path.concat(&ext.prefix), ext.child.clone()));
            }
            Node::Leaf(_) => {}
        }
    }
    Ok(())
}
