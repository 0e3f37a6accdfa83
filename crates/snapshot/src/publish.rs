use ethereum_types::H256;
use snapex_chaindb::BlockHeader;

use crate::{PublishError, StateNode, StorageNode};

mod file;
#[cfg(feature = "postgres")]
mod pg;

pub use file::FilePublisher;
#[cfg(feature = "postgres")]
pub use pg::PgPublisher;

/// A snapshot sink. The publisher itself is shared across workers; all node
/// and code records flow through per-worker [`PublisherTx`] handles.
///
/// Sinks must tolerate receiving the same record (same content hash) more
/// than once, within or across runs: recovery re-traverses interrupted
/// subtrees, so publication has to be an upsert or a no-op on conflict.
pub trait Publisher: Send + Sync {
    type Tx: PublisherTx;

    /// Emitted exactly once per run, before any worker starts.
    fn publish_header(&self, header: &BlockHeader) -> Result<(), PublishError>;

    /// Opens a transaction for one worker. Never shared between workers.
    fn begin(&self) -> Result<Self::Tx, PublishError>;
}

/// A per-worker transaction. Dropping it without [`PublisherTx::commit`]
/// rolls back everything it buffered.
pub trait PublisherTx {
    fn publish_state_node(
        &mut self,
        node: &StateNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError>;

    fn publish_storage_node(
        &mut self,
        node: &StorageNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError>;

    fn publish_code(
        &mut self,
        header_number: u64,
        code_hash: H256,
        code: &[u8],
    ) -> Result<(), PublishError>;

    fn commit(self) -> Result<(), PublishError>;
}
