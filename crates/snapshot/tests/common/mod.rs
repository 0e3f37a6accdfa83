#![allow(dead_code)] // not every test target uses every helper

//! Shared fixtures and publisher test doubles.
//!
//! Fixture chains are built with the trie builder and seeded into an
//! in-memory store; the expected node sets come from the builder's own
//! output, so the traversal engine is checked against independently
//! computed paths and hashes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use snapex_chaindb::{BlockHeader, InMemoryStore};
use snapex_snapshot::publish::{Publisher, PublisherTx};
use snapex_snapshot::{NodeKind, PublishError, StateNode, StorageNode};
use snapex_trie::{Account, BuiltTrie, EMPTY_TRIE_ROOT, KECCAK_EMPTY, Nibbles, Node, TrieBuilder};

/// Declarative account description for a fixture chain.
pub struct AccountSpec {
    pub address: Address,
    pub balance: u64,
    pub code: Option<Vec<u8>>,
    /// (slot, value) pairs; values may be zero.
    pub storage: Vec<(H256, u64)>,
}

impl AccountSpec {
    pub fn eoa(address: Address, balance: u64) -> Self {
        Self {
            address,
            balance,
            code: None,
            storage: Vec::new(),
        }
    }

    pub fn contract(address: Address, code: Vec<u8>, storage: Vec<(H256, u64)>) -> Self {
        Self {
            address,
            balance: 0,
            code: Some(code),
            storage,
        }
    }
}

pub struct Fixture {
    pub store: InMemoryStore,
    pub header: BlockHeader,
    pub state: BuiltTrie,
    /// Storage tries keyed by the owning account's 64-nibble leaf path.
    pub storage: HashMap<Nibbles, BuiltTrie>,
    /// Code hashes of contract accounts, keyed by address.
    pub code_hashes: HashMap<Address, H256>,
}

impl Fixture {
    /// 64-nibble state key path of an address.
    pub fn key_path(address: &Address) -> Nibbles {
        Nibbles::from_bytes(keccak(address).as_bytes())
    }

    /// Expected (path, hash) multiset of a full-trie walk.
    pub fn expected_state(&self) -> Vec<(Nibbles, H256)> {
        self.state
            .nodes
            .iter()
            .map(|n| (n.path.clone(), n.hash))
            .collect()
    }

    /// Expected state set of an address-selective walk: proof nodes on the
    /// way to a watched key, plus watched leaves themselves.
    pub fn expected_selective_state(&self, watched: &[Address]) -> Vec<(Nibbles, H256)> {
        let watched_paths: Vec<Nibbles> = watched.iter().map(Self::key_path).collect();
        self.state
            .nodes
            .iter()
            .filter(|n| {
                let allowed = watched_paths.iter().any(|w| n.path.is_prefix_of(w));
                if !allowed {
                    return false;
                }
                match Node::decode(&n.encoded).expect("fixture node decodes") {
                    Node::Leaf(leaf) => {
                        let full = n.path.concat(&leaf.partial);
                        watched_paths.iter().any(|w| *w == full)
                    }
                    _ => true,
                }
            })
            .map(|n| (n.path.clone(), n.hash))
            .collect()
    }

    /// Expected (account_path, path, hash) multiset of the storage walk of
    /// the given accounts.
    pub fn expected_storage(&self, addresses: &[Address]) -> Vec<(Nibbles, Nibbles, H256)> {
        let mut expected = Vec::new();
        for address in addresses {
            let account_path = Self::key_path(address);
            if let Some(trie) = self.storage.get(&account_path) {
                for node in &trie.nodes {
                    expected.push((account_path.clone(), node.path.clone(), node.hash));
                }
            }
        }
        expected
    }

    /// Depth of the state trie (in nodes) for recovery bounds.
    pub fn state_depth(&self) -> usize {
        self.state
            .nodes
            .iter()
            .map(|n| n.path.len() + 1)
            .max()
            .unwrap_or(0)
    }
}

pub fn build_fixture(height: u64, specs: &[AccountSpec]) -> Fixture {
    let store = InMemoryStore::new();
    let mut state_builder = TrieBuilder::new();
    let mut storage = HashMap::new();
    let mut code_hashes = HashMap::new();

    for spec in specs {
        let storage_root = if spec.storage.is_empty() {
            EMPTY_TRIE_ROOT
        } else {
            let mut builder = TrieBuilder::new();
            for (slot, value) in &spec.storage {
                builder.insert(
                    keccak(slot).as_bytes(),
                    rlp::encode(&U256::from(*value)).to_vec(),
                );
            }
            let trie = builder.build();
            store
                .add_trie_nodes(trie.hashed_nodes().map(|(h, raw)| (*h, raw.to_vec())))
                .unwrap();
            let root = trie.root;
            storage.insert(Fixture::key_path(&spec.address), trie);
            root
        };

        let code_hash = match &spec.code {
            Some(code) => {
                let hash = keccak(code);
                store.add_code(hash, code.clone()).unwrap();
                code_hashes.insert(spec.address, hash);
                hash
            }
            None => KECCAK_EMPTY,
        };

        let account = Account {
            nonce: 1,
            balance: U256::from(spec.balance),
            storage_root,
            code_hash,
        };
        state_builder.insert(
            keccak(spec.address).as_bytes(),
            rlp::encode(&account).to_vec(),
        );
    }

    let state = state_builder.build();
    store
        .add_trie_nodes(state.hashed_nodes().map(|(h, raw)| (*h, raw.to_vec())))
        .unwrap();

    let header = BlockHeader {
        parent_hash: H256::repeat_byte(0x42),
        state_root: state.root,
        number: height,
        timestamp: 1_600_000_000 + height,
    };
    store.add_header(header.clone()).unwrap();

    Fixture {
        store,
        header,
        state,
        storage,
        code_hashes,
    }
}

/// A handful of addresses with well-spread key paths.
pub fn addresses(count: usize) -> Vec<Address> {
    (1..=count as u8).map(Address::repeat_byte).collect()
}

/// Everything the recording publisher observed, at publish-call time.
#[derive(Default)]
pub struct Calls {
    pub headers: Vec<BlockHeader>,
    pub state_nodes: Vec<(StateNode, H256, u64)>,
    pub storage_nodes: Vec<(StorageNode, H256, u64)>,
    pub codes: Vec<(u64, H256, Vec<u8>)>,
    pub begun: usize,
    pub committed: usize,
    /// Set when a state node arrived before the header.
    pub node_before_header: bool,
}

impl Calls {
    pub fn state_set(&self) -> Vec<(Nibbles, H256)> {
        let mut set: Vec<_> = self
            .state_nodes
            .iter()
            .map(|(n, _, _)| (n.path.clone(), n.hash))
            .collect();
        set.sort();
        set
    }

    pub fn storage_set(&self) -> Vec<(Nibbles, Nibbles, H256)> {
        let mut set: Vec<_> = self
            .storage_nodes
            .iter()
            .map(|(n, _, _)| (n.account_path.clone(), n.path.clone(), n.hash))
            .collect();
        set.sort();
        set
    }

    pub fn leaf_count(&self) -> usize {
        self.state_nodes
            .iter()
            .filter(|(n, _, _)| n.kind == NodeKind::Leaf)
            .count()
    }
}

/// Publisher test double with transactional semantics: a transaction
/// buffers its records and moves them into the shared, mutex-guarded log on
/// commit, so dropped transactions leave nothing behind (like the real
/// sinks). Optionally starts failing state-node publishes after a budget of
/// successes, which is how the recovery scenarios force a mid-run error.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    calls: Arc<Mutex<Calls>>,
    /// Remaining successful state-node publishes; `None` never fails.
    budget: Option<Arc<AtomicI64>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(successes: i64) -> Self {
        Self {
            calls: Arc::default(),
            budget: Some(Arc::new(AtomicI64::new(successes))),
        }
    }

    pub fn calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().expect("calls lock")
    }
}

pub struct RecordingTx {
    calls: Arc<Mutex<Calls>>,
    budget: Option<Arc<AtomicI64>>,
    state_buf: Vec<(StateNode, H256, u64)>,
    storage_buf: Vec<(StorageNode, H256, u64)>,
    code_buf: Vec<(u64, H256, Vec<u8>)>,
}

impl Publisher for RecordingPublisher {
    type Tx = RecordingTx;

    fn publish_header(&self, header: &BlockHeader) -> Result<(), PublishError> {
        self.calls().headers.push(header.clone());
        Ok(())
    }

    fn begin(&self) -> Result<RecordingTx, PublishError> {
        self.calls().begun += 1;
        Ok(RecordingTx {
            calls: self.calls.clone(),
            budget: self.budget.clone(),
            state_buf: Vec::new(),
            storage_buf: Vec::new(),
            code_buf: Vec::new(),
        })
    }
}

impl PublisherTx for RecordingTx {
    fn publish_state_node(
        &mut self,
        node: &StateNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError> {
        if let Some(budget) = &self.budget {
            if budget.fetch_sub(1, Ordering::SeqCst) <= 0 {
                return Err(PublishError::Rejected("publish budget exhausted".into()));
            }
        }
        {
            let mut calls = self.calls.lock().expect("calls lock");
            if calls.headers.is_empty() {
                calls.node_before_header = true;
            }
        }
        self.state_buf.push((node.clone(), header_hash, header_number));
        Ok(())
    }

    fn publish_storage_node(
        &mut self,
        node: &StorageNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError> {
        self.storage_buf
            .push((node.clone(), header_hash, header_number));
        Ok(())
    }

    fn publish_code(
        &mut self,
        header_number: u64,
        code_hash: H256,
        code: &[u8],
    ) -> Result<(), PublishError> {
        self.code_buf.push((header_number, code_hash, code.to_vec()));
        Ok(())
    }

    fn commit(self) -> Result<(), PublishError> {
        let mut calls = self.calls.lock().expect("calls lock");
        calls.state_nodes.extend(self.state_buf);
        calls.storage_nodes.extend(self.storage_buf);
        calls.codes.extend(self.code_buf);
        calls.committed += 1;
        Ok(())
    }
}
