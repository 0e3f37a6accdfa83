use std::path::{Path, PathBuf};

use ethereum_types::H256;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use tracing::info;

use crate::{BlockHeader, ChainStore, StoreError};

const CF_HEADERS: &str = "headers";
const CF_STATE: &str = "state";
const CF_CODE: &str = "code";
const COLUMN_FAMILIES: [&str; 3] = [CF_HEADERS, CF_STATE, CF_CODE];

/// Meta key in the headers column family holding the highest stored height.
const LATEST_HEIGHT_KEY: &[u8] = b"latest";

fn header_key(number: u64) -> [u8; 8] {
    number.to_be_bytes()
}

/// RocksDB-backed chain store.
///
/// Snapshot runs open both the primary and the optional ancient (frozen
/// segment) database read-only; lookups fall through to the ancient store
/// when the primary misses. [`RocksDbStore::create`] opens read-write and is
/// how seeding tools and tests populate a store.
pub struct RocksDbStore {
    primary: DB,
    ancient: Option<DB>,
}

impl RocksDbStore {
    /// Opens an existing store (and optionally its ancient segment) for
    /// reading. The snapshot core never mutates the source database.
    pub fn open(primary: &Path, ancient: Option<&Path>) -> Result<Self, StoreError> {
        let primary_db = open_read_only(primary)?;
        let ancient_db = ancient.map(open_read_only).transpose()?;
        info!(path = %primary.display(), has_ancient = ancient.is_some(), "opened chain store");
        Ok(Self {
            primary: primary_db,
            ancient: ancient_db,
        })
    }

    /// Creates (or opens) a store read-write.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|e| db_open_error(path, e))?;
        Ok(Self {
            primary: db,
            ancient: None,
        })
    }

    pub fn put_header(&self, header: &BlockHeader) -> Result<(), StoreError> {
        let cf = self.primary_cf(CF_HEADERS)?;
        let number = header.number;
        self.primary
            .put_cf(cf, header_key(number), rlp::encode(header))?;
        let latest = self
            .primary
            .get_cf(cf, LATEST_HEIGHT_KEY)?
            .map(decode_height)
            .transpose()?;
        if latest.map_or(true, |h| h < number) {
            self.primary
                .put_cf(cf, LATEST_HEIGHT_KEY, header_key(number))?;
        }
        Ok(())
    }

    pub fn put_trie_node(&self, hash: H256, encoded: &[u8]) -> Result<(), StoreError> {
        let cf = self.primary_cf(CF_STATE)?;
        Ok(self.primary.put_cf(cf, hash.as_bytes(), encoded)?)
    }

    pub fn put_code(&self, hash: H256, code: &[u8]) -> Result<(), StoreError> {
        let cf = self.primary_cf(CF_CODE)?;
        Ok(self.primary.put_cf(cf, hash.as_bytes(), code)?)
    }

    fn primary_cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.primary
            .cf_handle(name)
            .ok_or(StoreError::MissingColumnFamily(name))
    }

    /// Primary lookup with ancient fallback.
    fn get(&self, cf: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = get_in(&self.primary, cf, key)? {
            return Ok(Some(value));
        }
        match &self.ancient {
            Some(db) => get_in(db, cf, key),
            None => Ok(None),
        }
    }
}

impl RocksDbStore {
    /// The recorded tip. The primary store wins; a store with only frozen
    /// data answers from the ancient segment.
    fn latest_height(&self) -> Result<Option<u64>, StoreError> {
        for db in std::iter::once(&self.primary).chain(self.ancient.as_ref()) {
            if let Some(raw) = get_in(db, CF_HEADERS, LATEST_HEIGHT_KEY)? {
                return Ok(Some(decode_height(raw)?));
            }
        }
        Ok(None)
    }
}

impl ChainStore for RocksDbStore {
    fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, StoreError> {
        if let Some(raw) = self.get(CF_HEADERS, &header_key(number))? {
            return Ok(Some(rlp::decode(&raw)?));
        }
        // A hole below the tip is a broken store, not a clean miss.
        if self.latest_height()?.is_some_and(|tip| tip > number) {
            return Err(StoreError::ChainGap(number));
        }
        Ok(None)
    }

    fn latest_header(&self) -> Result<Option<BlockHeader>, StoreError> {
        match self.latest_height()? {
            Some(height) => self.header_by_number(height),
            None => Ok(None),
        }
    }

    fn trie_node(&self, hash: H256) -> Result<Vec<u8>, StoreError> {
        self.get(CF_STATE, hash.as_bytes())?
            .ok_or(StoreError::MissingNode(hash))
    }

    fn code(&self, hash: H256) -> Result<Vec<u8>, StoreError> {
        self.get(CF_CODE, hash.as_bytes())?
            .ok_or(StoreError::MissingCode(hash))
    }
}

fn open_read_only(path: &Path) -> Result<DB, StoreError> {
    let opts = Options::default();
    DB::open_cf_for_read_only(&opts, path, COLUMN_FAMILIES, false)
        .map_err(|e| db_open_error(path, e))
}

fn db_open_error(path: &Path, e: rocksdb::Error) -> StoreError {
    StoreError::DbOpen {
        path: PathBuf::from(path),
        reason: e.to_string(),
    }
}

fn decode_height(raw: Vec<u8>) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = raw
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::Decode(rlp::DecoderError::Custom("bad height record")))?;
    Ok(u64::from_be_bytes(bytes))
}

fn get_in(db: &DB, cf: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
    let handle = db
        .cf_handle(cf)
        .ok_or(StoreError::MissingColumnFamily(cf))?;
    Ok(db.get_cf(handle, key)?)
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(number: u64) -> BlockHeader {
        BlockHeader {
            parent_hash: H256::repeat_byte(0xaa),
            state_root: H256::repeat_byte(number as u8),
            number,
            timestamp: number,
        }
    }

    #[test]
    fn write_then_read_back_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let node_hash = H256::repeat_byte(0x33);
        {
            let store = RocksDbStore::create(dir.path()).unwrap();
            store.put_header(&header(5)).unwrap();
            store.put_header(&header(7)).unwrap();
            store.put_trie_node(node_hash, &[1, 2, 3]).unwrap();
            store.put_code(node_hash, &[0xde, 0xad]).unwrap();
        }

        let store = RocksDbStore::open(dir.path(), None).unwrap();
        assert_eq!(store.header_by_number(5).unwrap().unwrap(), header(5));
        assert!(matches!(
            store.header_by_number(6),
            Err(StoreError::ChainGap(6))
        ));
        assert!(store.header_by_number(9).unwrap().is_none());
        assert_eq!(store.latest_header().unwrap().unwrap().number, 7);
        assert_eq!(store.trie_node(node_hash).unwrap(), vec![1, 2, 3]);
        assert_eq!(store.code(node_hash).unwrap(), vec![0xde, 0xad]);
        assert!(matches!(
            store.trie_node(H256::zero()),
            Err(StoreError::MissingNode(_))
        ));
    }

    #[test]
    fn ancient_store_answers_primary_misses() {
        let primary_dir = tempfile::tempdir().unwrap();
        let ancient_dir = tempfile::tempdir().unwrap();
        let frozen = H256::repeat_byte(0x44);
        {
            let store = RocksDbStore::create(primary_dir.path()).unwrap();
            store.put_trie_node(H256::repeat_byte(0x55), &[5]).unwrap();
        }
        {
            let store = RocksDbStore::create(ancient_dir.path()).unwrap();
            store.put_trie_node(frozen, &[9, 9]).unwrap();
            store.put_header(&header(1)).unwrap();
        }

        let store = RocksDbStore::open(primary_dir.path(), Some(ancient_dir.path())).unwrap();
        assert_eq!(store.trie_node(frozen).unwrap(), vec![9, 9]);
        assert_eq!(store.trie_node(H256::repeat_byte(0x55)).unwrap(), vec![5]);
        assert_eq!(store.header_by_number(1).unwrap().unwrap(), header(1));
        assert_eq!(store.latest_header().unwrap().unwrap().number, 1);
    }

    #[test]
    fn open_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            RocksDbStore::open(&missing, None),
            Err(StoreError::DbOpen { .. })
        ));
    }
}
