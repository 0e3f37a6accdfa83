use ethereum_types::H256;
use snapex_chaindb::ChainStore;
use snapex_trie::{EMPTY_TRIE_ROOT, Nibbles, Node, NodeRef};
use tracing::debug;

use crate::walker::resolve_node;
use crate::SnapshotError;

/// One unit of worker traversal: a root-prefixed subtree.
#[derive(Debug, Clone)]
pub struct SubtreeJob {
    /// Position of the subtree root in the state trie.
    pub prefix: Nibbles,
    pub root: NodeRef,
}

/// A node the partitioner consumed while cutting the trie (the state root
/// and any branch it expanded). Spine nodes are not part of any job; the
/// orchestrator publishes them once, separately.
#[derive(Debug)]
pub struct SpineNode {
    pub path: Nibbles,
    pub encoded: Vec<u8>,
    pub hash: H256,
    pub node: Node,
}

#[derive(Debug)]
pub struct Partition {
    pub spine: Vec<SpineNode>,
    pub jobs: Vec<SubtreeJob>,
}

/// Cuts the trie under `state_root` into at least `workers` disjoint
/// subtrees when the trie shape allows it.
///
/// The root branch is expanded into its non-empty children; while the job
/// count stays short of the target, the first job that resolves to a branch
/// is expanded in place. Replacing a job by its children keeps the frontier
/// prefixes pairwise incomparable, and together with the spine they cover
/// every reachable node exactly once.
pub fn partition(
    store: &dyn ChainStore,
    state_root: H256,
    workers: usize,
) -> Result<Partition, SnapshotError> {
    let mut spine = Vec::new();
    let mut jobs = Vec::new();
    if state_root == EMPTY_TRIE_ROOT {
        return Ok(Partition { spine, jobs });
    }

    jobs.push(SubtreeJob {
        prefix: Nibbles::new(),
        root: NodeRef::Hash(state_root),
    });

    let mut cursor = 0;
    while workers > 1 && jobs.len() < workers && cursor < jobs.len() {
        let (encoded, hash, node) = resolve_node(store, &jobs[cursor].root)?;
        let Node::Branch(ref branch) = node else {
            // Leaves and extensions stay whole jobs.
            cursor += 1;
            continue;
        };
        let job = jobs.remove(cursor);
        for (i, (choice, child)) in branch.children().enumerate() {
            jobs.insert(
                cursor + i,
                SubtreeJob {
                    prefix: job.prefix.append_new(choice),
                    root: child.clone(),
                },
            );
        }
        spine.push(SpineNode {
            path: job.prefix,
            encoded,
            hash,
            node,
        });
        // The cursor is left in place: the expanded branch's first child is
        // the next expansion candidate if more jobs are still needed.
    }

    debug!(
        jobs = jobs.len(),
        spine = spine.len(),
        workers,
        "partitioned state trie"
    );
    Ok(Partition { spine, jobs })
}
