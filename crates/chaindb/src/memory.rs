use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use ethereum_types::H256;

use crate::{BlockHeader, ChainStore, StoreError};

/// Mutex-guarded in-memory chain store. Used by tests and fixtures; cloning
/// shares the underlying maps.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    headers: BTreeMap<u64, BlockHeader>,
    state: HashMap<H256, Vec<u8>>,
    code: HashMap<H256, Vec<u8>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_header(&self, header: BlockHeader) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        inner.headers.insert(header.number, header);
        Ok(())
    }

    pub fn add_trie_nodes<I>(&self, nodes: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (H256, Vec<u8>)>,
    {
        let mut inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        inner.state.extend(nodes);
        Ok(())
    }

    pub fn add_code(&self, hash: H256, code: Vec<u8>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        inner.code.insert(hash, code);
        Ok(())
    }
}

impl ChainStore for InMemoryStore {
    fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        match inner.headers.get(&number) {
            Some(header) => Ok(Some(header.clone())),
            // A hole below the tip is a broken store, not a clean miss.
            None if inner.headers.keys().next_back().is_some_and(|max| *max > number) => {
                Err(StoreError::ChainGap(number))
            }
            None => Ok(None),
        }
    }

    fn latest_header(&self) -> Result<Option<BlockHeader>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        Ok(inner.headers.values().next_back().cloned())
    }

    fn trie_node(&self, hash: H256) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        inner
            .state
            .get(&hash)
            .cloned()
            .ok_or(StoreError::MissingNode(hash))
    }

    fn code(&self, hash: H256) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::LockError)?;
        inner
            .code
            .get(&hash)
            .cloned()
            .ok_or(StoreError::MissingCode(hash))
    }
}
