use ethereum_types::H256;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open chain store at {path:?}: {reason}")]
    DbOpen { path: PathBuf, reason: String },
    #[error("chain gap: no header at {0} although the chain tip is higher")]
    ChainGap(u64),
    #[error("missing trie node {0:#x}")]
    MissingNode(H256),
    #[error("missing contract code {0:#x}")]
    MissingCode(H256),
    #[error("corrupted chain record: {0}")]
    Decode(#[from] rlp::DecoderError),
    #[cfg(feature = "rocksdb")]
    #[error("rocksdb error: {0}")]
    Rocksdb(#[from] rocksdb::Error),
    #[error("missing column family {0}")]
    MissingColumnFamily(&'static str),
    #[error("poisoned store lock")]
    LockError,
}
