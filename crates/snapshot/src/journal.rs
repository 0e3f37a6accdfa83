use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use snapex_trie::Nibbles;
use tracing::{debug, info};

use crate::JournalError;

const STATUS_STARTED: &str = "started";
const STATUS_DONE: &str = "done";

/// Append-only log of in-flight subtree roots.
///
/// One line per entry, `worker_id,path_hex,status`, lowercase hex with two
/// characters per nibble. Appends are single writes behind a mutex and the
/// file is flushed per line; losing an unflushed `done` on a crash only
/// causes a correct re-traversal, so no fsync is needed.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

/// What a pre-existing journal says about the previous run.
#[derive(Debug, Default)]
pub struct JournalState {
    /// Present at startup, i.e. this run is a recovery run.
    pub recovering: bool,
    /// Subtree paths whose `started` entry has a matching `done`.
    pub completed: HashSet<Nibbles>,
    /// `started` entries with no matching `done`: interrupted subtrees.
    pub inflight: Vec<(u32, Nibbles)>,
}

impl Journal {
    /// Opens the journal for appending, parsing any entries a previous run
    /// left behind.
    pub fn load_or_create(path: &Path) -> Result<(Self, JournalState), JournalError> {
        let state = if path.exists() {
            let state = parse(path)?;
            info!(
                path = %path.display(),
                completed = state.completed.len(),
                inflight = state.inflight.len(),
                "recovery journal found, resuming previous run"
            );
            state
        } else {
            JournalState::default()
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                file: Mutex::new(file),
            },
            state,
        ))
    }

    pub fn record_started(&self, worker_id: u32, path: &Nibbles) -> Result<(), JournalError> {
        self.append(worker_id, path, STATUS_STARTED)
    }

    /// Only called after the worker's publisher transaction has committed.
    pub fn record_done(&self, worker_id: u32, path: &Nibbles) -> Result<(), JournalError> {
        self.append(worker_id, path, STATUS_DONE)
    }

    fn append(&self, worker_id: u32, path: &Nibbles, status: &str) -> Result<(), JournalError> {
        let line = format!("{},{},{}\n", worker_id, path.to_hex(), status);
        let mut file = self.file.lock().map_err(|_| JournalError::LockError)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Deletes the journal after a clean run.
    pub fn remove(self) -> Result<(), JournalError> {
        debug!(path = %self.path.display(), "removing recovery journal");
        drop(self.file);
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

fn parse(path: &Path) -> Result<JournalState, JournalError> {
    let content = fs::read_to_string(path)?;
    // A crash can leave a torn final line; everything after the last
    // newline is ignored.
    let complete = match content.rfind('\n') {
        Some(end) => &content[..end],
        None => "",
    };

    let mut started: Vec<(u32, Nibbles)> = Vec::new();
    let mut completed = HashSet::new();
    for (index, line) in complete.split('\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: &str| JournalError::Malformed {
            line: index + 1,
            reason: reason.to_string(),
        };
        let mut fields = line.split(',');
        let (Some(worker), Some(path_hex), Some(status), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(malformed("expected 3 comma-separated fields"));
        };
        let worker_id: u32 = worker.parse().map_err(|_| malformed("bad worker id"))?;
        let path = Nibbles::from_hex(path_hex).map_err(|_| malformed("bad path hex"))?;
        match status {
            STATUS_STARTED => started.push((worker_id, path)),
            STATUS_DONE => {
                completed.insert(path);
            }
            _ => return Err(malformed("unknown status")),
        }
    }

    let inflight = started
        .into_iter()
        .filter(|(_, path)| !completed.contains(path))
        .collect();
    Ok(JournalState {
        recovering: true,
        completed,
        inflight,
    })
}
