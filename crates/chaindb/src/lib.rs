//! Chain-store access for snapshot extraction.
//!
//! The snapshot core reads three namespaces: canonical block headers by
//! height, state/storage trie nodes by hash and contract code by hash. The
//! [`ChainStore`] trait is that read contract; the store is an immutable
//! view for the duration of a run and implementations must be safe to share
//! across worker threads.

mod error;
mod header;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use error::StoreError;
pub use header::BlockHeader;
pub use memory::InMemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

use ethereum_types::H256;

pub trait ChainStore: Send + Sync {
    /// Canonical header at `number`, or `None` when the chain has no block
    /// at that height.
    fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, StoreError>;

    /// The highest header the store knows about.
    fn latest_header(&self) -> Result<Option<BlockHeader>, StoreError>;

    /// Raw RLP of the trie node stored under the keccak of its encoding.
    /// A miss is [`StoreError::MissingNode`]: the caller asked for a node
    /// the state root claims exists, so absence means a broken store.
    fn trie_node(&self, hash: H256) -> Result<Vec<u8>, StoreError>;

    /// Contract bytecode by code hash. A miss is [`StoreError::MissingCode`].
    fn code(&self, hash: H256) -> Result<Vec<u8>, StoreError>;
}
