use snapex_chaindb::StoreError;
use snapex_trie::TrieError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Trie(#[from] TrieError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("recovery journal failure: {0}")]
    Journal(#[from] JournalError),
    #[error("no canonical header at height {0}")]
    HeaderNotFound(u64),
    #[error("chain store holds no headers")]
    EmptyChain,
    #[error("dangling empty node reference")]
    EmptyNodeRef,
    #[error("run cancelled")]
    Cancelled,
    #[error("worker thread panicked")]
    WorkerPanic,
}

/// Pre-flight configuration rejection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown snapshot mode {0:?} (expected \"relational\" or \"file\")")]
    UnknownMode(String),
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("missing chain database path")]
    MissingDbPath,
    #[error("relational mode requires --database.url")]
    MissingDatabaseUrl,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("sink io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink rejected record: {0}")]
    Rejected(String),
    #[cfg(feature = "postgres")]
    #[error("postgres failure: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("poisoned sink lock")]
    LockError,
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed journal line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("poisoned journal lock")]
    LockError,
}
