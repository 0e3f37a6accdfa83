//! Parallel, recoverable extraction of an Ethereum world-state.
//!
//! The pipeline snapshots the state trie rooted at a chosen block: the
//! partitioner cuts the trie into disjoint root-prefixed subtrees, workers
//! walk one subtree at a time depth-first and publish every node (plus
//! contract storage and code) through a per-worker publisher transaction,
//! and the recovery journal bounds how much a crashed run has to republish.

pub mod config;
pub mod filter;
pub mod journal;
pub mod partition;
pub mod publish;
pub mod service;
pub mod types;

mod error;
mod walker;

pub use config::{SnapshotConfig, SnapshotMode};
pub use error::{ConfigError, JournalError, PublishError, SnapshotError};
pub use filter::AddressFilter;
pub use service::{SnapshotParams, SnapshotService};
pub use types::{NodeKind, StateNode, StorageNode};
