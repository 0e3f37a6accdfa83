use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use ethereum_types::{Address, H256};
use snapex_chaindb::{BlockHeader, ChainStore};
use snapex_trie::Nibbles;
use tracing::{debug, info, warn};

use crate::filter::AddressFilter;
use crate::journal::Journal;
use crate::partition::{Partition, SubtreeJob, partition};
use crate::publish::{Publisher, PublisherTx};
use crate::types::{NodeKind, StateNode};
use crate::walker::{WorkerCtx, walk_subtree};
use crate::SnapshotError;

/// Parameters of one snapshot run.
#[derive(Debug, Clone)]
pub struct SnapshotParams {
    pub height: u64,
    pub workers: usize,
    /// `None` walks the full trie; `Some` restricts the walk to the listed
    /// accounts (an empty list publishes no leaves at all).
    pub watched_addresses: Option<Vec<Address>>,
}

/// The snapshot orchestrator: resolves the header, partitions the trie,
/// fans subtree jobs out to workers and drives the recovery journal.
pub struct SnapshotService<S, P> {
    store: S,
    publisher: P,
    recovery_path: PathBuf,
}

impl<S: ChainStore, P: Publisher> SnapshotService<S, P> {
    pub fn new(store: S, publisher: P, recovery_path: PathBuf) -> Self {
        Self {
            store,
            publisher,
            recovery_path,
        }
    }

    /// Snapshots the state at `params.height`.
    pub fn create_snapshot(&self, params: SnapshotParams) -> Result<(), SnapshotError> {
        let header = self
            .store
            .header_by_number(params.height)?
            .ok_or(SnapshotError::HeaderNotFound(params.height))?;
        self.run(header, params.workers.max(1), params.watched_addresses.as_deref())
    }

    /// Snapshots the state at the highest header the store knows about.
    pub fn create_latest_snapshot(
        &self,
        workers: usize,
        watched_addresses: Option<Vec<Address>>,
    ) -> Result<(), SnapshotError> {
        let header = self.store.latest_header()?.ok_or(SnapshotError::EmptyChain)?;
        info!(height = header.number, "snapshotting latest header");
        self.run(header, workers.max(1), watched_addresses.as_deref())
    }

    fn run(
        &self,
        header: BlockHeader,
        workers: usize,
        watched: Option<&[Address]>,
    ) -> Result<(), SnapshotError> {
        let started_at = Instant::now();
        let header_hash = header.hash();
        let header_number = header.number;
        let filter = watched.map(AddressFilter::new);
        info!(
            height = header_number,
            state_root = %header.state_root,
            workers,
            watched = filter.as_ref().map(AddressFilter::len),
            "starting state snapshot"
        );

        // The header is published exactly once, before any node.
        self.publisher.publish_header(&header)?;

        let Partition { spine, jobs } = partition(&self.store, header.state_root, workers)?;
        let (journal, previous) = Journal::load_or_create(&self.recovery_path)?;

        self.publish_spine(&journal, &previous.completed, &spine, &filter, header_hash, header_number)?;

        let pending: Vec<SubtreeJob> = jobs
            .into_iter()
            .filter(|job| !previous.completed.contains(&job.prefix))
            .collect();
        if previous.recovering {
            info!(
                pending = pending.len(),
                skipped = previous.completed.len(),
                "recovery run: re-walking unfinished subtrees"
            );
        }

        let mut assignments: Vec<Vec<SubtreeJob>> = (0..workers).map(|_| Vec::new()).collect();
        for (i, job) in pending.into_iter().enumerate() {
            assignments[i % workers].push(job);
        }

        let cancel = AtomicBool::new(false);
        let first_error: Mutex<Option<SnapshotError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for (worker_id, jobs) in assignments.into_iter().enumerate() {
                if jobs.is_empty() {
                    continue;
                }
                let cancel = &cancel;
                let first_error = &first_error;
                let journal = &journal;
                let filter = filter.as_ref();
                let publisher = &self.publisher;
                let store = &self.store;
                scope.spawn(move || {
                    let outcome = run_worker(
                        store,
                        publisher,
                        journal,
                        filter,
                        cancel,
                        header_hash,
                        header_number,
                        worker_id as u32,
                        &jobs,
                    );
                    if let Err(err) = outcome {
                        if matches!(err, SnapshotError::Cancelled) {
                            return;
                        }
                        warn!(worker_id, %err, "worker failed, cancelling run");
                        cancel.store(true, Ordering::Relaxed);
                        if let Ok(mut slot) = first_error.lock() {
                            slot.get_or_insert(err);
                        }
                    }
                });
            }
        });

        match first_error.into_inner() {
            Ok(Some(err)) => {
                // The journal stays behind for the recovery run.
                warn!(%err, "snapshot failed, recovery journal retained");
                Err(err)
            }
            Ok(None) => {
                journal.remove()?;
                info!(
                    height = header_number,
                    elapsed = ?started_at.elapsed(),
                    "state snapshot complete"
                );
                Ok(())
            }
            Err(_) => Err(SnapshotError::WorkerPanic),
        }
    }

    /// Publishes the partitioner's expanded interior (the state root and any
    /// branch it split) in its own transaction, journaled under the empty
    /// path so a recovery run skips it once committed.
    fn publish_spine(
        &self,
        journal: &Journal,
        completed: &std::collections::HashSet<Nibbles>,
        spine: &[crate::partition::SpineNode],
        filter: &Option<AddressFilter>,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), SnapshotError> {
        let spine_key = Nibbles::new();
        if spine.is_empty() || completed.contains(&spine_key) {
            return Ok(());
        }
        journal.record_started(0, &spine_key)?;
        let mut tx = self.publisher.begin()?;
        for node in spine {
            if let Some(filter) = filter {
                if !filter.allows(&node.path) {
                    continue;
                }
            }
            tx.publish_state_node(
                &StateNode {
                    path: node.path.clone(),
                    kind: NodeKind::of(&node.node),
                    encoded: node.encoded.clone(),
                    hash: node.hash,
                    leaf_key: None,
                },
                header_hash,
                header_number,
            )?;
        }
        tx.commit()?;
        journal.record_done(0, &spine_key)?;
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker<S: ChainStore, P: Publisher>(
    store: &S,
    publisher: &P,
    journal: &Journal,
    filter: Option<&AddressFilter>,
    cancel: &AtomicBool,
    header_hash: H256,
    header_number: u64,
    worker_id: u32,
    jobs: &[SubtreeJob],
) -> Result<(), SnapshotError> {
    let mut tx = publisher.begin()?;
    for job in jobs {
        if cancel.load(Ordering::Relaxed) {
            return Err(SnapshotError::Cancelled);
        }
        journal.record_started(worker_id, &job.prefix)?;
        let mut ctx = WorkerCtx {
            store,
            tx: &mut tx,
            header_hash,
            header_number,
            filter,
            cancel,
        };
        walk_subtree(&mut ctx, job)?;
        debug!(worker_id, subtree = %job.prefix, "subtree walked");
    }
    tx.commit()?;
    // `done` is recorded only once the transaction is in; a crash in
    // between re-walks these subtrees, which the sink absorbs as upserts.
    for job in jobs {
        journal.record_done(worker_id, &job.prefix)?;
    }
    Ok(())
}
