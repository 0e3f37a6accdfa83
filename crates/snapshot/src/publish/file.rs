use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use ethereum_types::H256;
use snapex_chaindb::BlockHeader;
use snapex_trie::Nibbles;
use tracing::info;

use crate::publish::{Publisher, PublisherTx};
use crate::{PublishError, StateNode, StorageNode};

const HEADERS_FILE: &str = "headers.csv";
const STATE_FILE: &str = "state_nodes.csv";
const STORAGE_FILE: &str = "storage_nodes.csv";
const CODE_FILE: &str = "code.csv";

/// File-mode sink: one CSV file per record type under an output directory.
///
/// A transaction buffers its rows in memory and appends them to the shared
/// files on commit, so rows from a rolled-back worker never reach disk and
/// concurrent committers interleave at row granularity only. Every table
/// keeps a key set of the rows it already holds (seeded from the files on
/// open, so a recovery run appending to a previous run's output is covered
/// too); re-publishing the same record drops the duplicate row, mirroring
/// the relational sink's `ON CONFLICT DO NOTHING`.
pub struct FilePublisher {
    sink: Arc<FileSink>,
}

struct FileSink {
    headers: Table,
    state_nodes: Table,
    storage_nodes: Table,
    code: Table,
}

/// One CSV file plus the keys of the rows it already contains.
struct Table {
    inner: Mutex<TableState>,
}

struct TableState {
    file: BufWriter<File>,
    seen: HashSet<String>,
}

/// A buffered row: the dedup key is built from the same formatted fields
/// that make up the line, so it always matches what a reopened table
/// re-derives from disk.
struct Row {
    key: String,
    line: String,
}

/// Extracts a row's key from its CSV fields.
fn row_key(line: &str, key_fields: &[usize]) -> Option<String> {
    let fields: Vec<&str> = line.split(',').collect();
    let mut parts = Vec::with_capacity(key_fields.len());
    for &index in key_fields {
        parts.push(*fields.get(index)?);
    }
    Some(parts.join(","))
}

fn open_table(dir: &Path, name: &str, key_fields: &[usize]) -> Result<Table, PublishError> {
    let path = dir.join(name);
    let mut seen = HashSet::new();
    if path.exists() {
        for line in fs::read_to_string(&path)?.lines() {
            if let Some(key) = row_key(line, key_fields) {
                seen.insert(key);
            }
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Table {
        inner: Mutex::new(TableState {
            file: BufWriter::new(file),
            seen,
        }),
    })
}

impl Table {
    /// Appends the rows whose keys are not on disk yet.
    fn append(&self, rows: Vec<Row>) -> Result<(), PublishError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut state = self.inner.lock().map_err(|_| PublishError::LockError)?;
        for row in rows {
            if state.seen.insert(row.key) {
                state.file.write_all(row.line.as_bytes())?;
            }
        }
        state.file.flush()?;
        Ok(())
    }
}

fn leaf_key_field(leaf_key: &Option<Nibbles>) -> String {
    leaf_key.as_ref().map(Nibbles::to_hex).unwrap_or_default()
}

impl FilePublisher {
    pub fn new(output_dir: &Path) -> Result<Self, PublishError> {
        fs::create_dir_all(output_dir)?;
        info!(dir = %output_dir.display(), "writing snapshot to csv files");
        Ok(Self {
            sink: Arc::new(FileSink {
                // Key columns match the relational sink's conflict targets.
                headers: open_table(output_dir, HEADERS_FILE, &[1])?,
                state_nodes: open_table(output_dir, STATE_FILE, &[0, 2])?,
                storage_nodes: open_table(output_dir, STORAGE_FILE, &[0, 2, 3])?,
                code: open_table(output_dir, CODE_FILE, &[1])?,
            }),
        })
    }
}

impl Publisher for FilePublisher {
    type Tx = FileTx;

    fn publish_header(&self, header: &BlockHeader) -> Result<(), PublishError> {
        let hash = format!("{:#x}", header.hash());
        let line = format!(
            "{},{},{:#x},{:#x},{}\n",
            header.number,
            hash,
            header.parent_hash,
            header.state_root,
            header.timestamp,
        );
        self.sink.headers.append(vec![Row { key: hash, line }])
    }

    fn begin(&self) -> Result<FileTx, PublishError> {
        Ok(FileTx {
            sink: self.sink.clone(),
            state_rows: Vec::new(),
            storage_rows: Vec::new(),
            code_rows: Vec::new(),
        })
    }
}

pub struct FileTx {
    sink: Arc<FileSink>,
    state_rows: Vec<Row>,
    storage_rows: Vec<Row>,
    code_rows: Vec<Row>,
}

impl PublisherTx for FileTx {
    fn publish_state_node(
        &mut self,
        node: &StateNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError> {
        let header_hash = format!("{header_hash:#x}");
        let path = node.path.to_hex();
        let key = format!("{header_hash},{path}");
        let line = format!(
            "{},{},{},{},{:#x},{},{}\n",
            header_hash,
            header_number,
            path,
            node.kind.as_str(),
            node.hash,
            leaf_key_field(&node.leaf_key),
            hex::encode(&node.encoded),
        );
        self.state_rows.push(Row { key, line });
        Ok(())
    }

    fn publish_storage_node(
        &mut self,
        node: &StorageNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError> {
        let header_hash = format!("{header_hash:#x}");
        let account_path = node.account_path.to_hex();
        let path = node.path.to_hex();
        let key = format!("{header_hash},{account_path},{path}");
        let line = format!(
            "{},{},{},{},{},{:#x},{},{}\n",
            header_hash,
            header_number,
            account_path,
            path,
            node.kind.as_str(),
            node.hash,
            leaf_key_field(&node.leaf_key),
            hex::encode(&node.encoded),
        );
        self.storage_rows.push(Row { key, line });
        Ok(())
    }

    fn publish_code(
        &mut self,
        header_number: u64,
        code_hash: H256,
        code: &[u8],
    ) -> Result<(), PublishError> {
        let code_hash = format!("{code_hash:#x}");
        let line = format!("{},{},{}\n", header_number, code_hash, hex::encode(code));
        self.code_rows.push(Row {
            key: code_hash,
            line,
        });
        Ok(())
    }

    fn commit(self) -> Result<(), PublishError> {
        self.sink.state_nodes.append(self.state_rows)?;
        self.sink.storage_nodes.append(self.storage_rows)?;
        self.sink.code.append(self.code_rows)?;
        Ok(())
    }
}
