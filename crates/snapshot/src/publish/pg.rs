use ethereum_types::H256;
use snapex_chaindb::BlockHeader;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::runtime::{Handle, Runtime};
use tracing::info;

use crate::publish::{Publisher, PublisherTx};
use crate::{PublishError, StateNode, StorageNode};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS headers (
    number       BIGINT NOT NULL,
    hash         TEXT PRIMARY KEY,
    parent_hash  TEXT NOT NULL,
    state_root   TEXT NOT NULL,
    timestamp    BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS state_nodes (
    header_hash   TEXT NOT NULL,
    header_number BIGINT NOT NULL,
    path          TEXT NOT NULL,
    kind          TEXT NOT NULL,
    node_hash     TEXT NOT NULL,
    leaf_key      TEXT,
    encoded       BYTEA NOT NULL,
    PRIMARY KEY (header_hash, path)
);
CREATE TABLE IF NOT EXISTS storage_nodes (
    header_hash   TEXT NOT NULL,
    header_number BIGINT NOT NULL,
    account_path  TEXT NOT NULL,
    path          TEXT NOT NULL,
    kind          TEXT NOT NULL,
    node_hash     TEXT NOT NULL,
    leaf_key      TEXT,
    encoded       BYTEA NOT NULL,
    PRIMARY KEY (header_hash, account_path, path)
);
CREATE TABLE IF NOT EXISTS code (
    header_number BIGINT NOT NULL,
    code_hash     TEXT PRIMARY KEY,
    code          BYTEA NOT NULL
);
"#;

fn hash_field(hash: H256) -> String {
    format!("{hash:#x}")
}

/// Relational-mode sink backed by a Postgres pool.
///
/// The publisher owns a small tokio runtime and drives sqlx from blocking
/// worker threads with `block_on`, keeping the traversal engine synchronous.
/// All inserts are `ON CONFLICT DO NOTHING`, which is what makes recovery
/// re-publication safe.
pub struct PgPublisher {
    pool: PgPool,
    runtime: Runtime,
}

impl PgPublisher {
    pub fn connect(database_url: &str) -> Result<Self, PublishError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let pool = runtime.block_on(async {
            let pool = PgPoolOptions::new().connect(database_url).await?;
            sqlx::raw_sql(SCHEMA).execute(&pool).await?;
            Ok::<_, sqlx::Error>(pool)
        })?;
        info!("connected to relational sink");
        Ok(Self { pool, runtime })
    }
}

impl Publisher for PgPublisher {
    type Tx = PgTx;

    fn publish_header(&self, header: &BlockHeader) -> Result<(), PublishError> {
        self.runtime.block_on(async {
            sqlx::query(
                "INSERT INTO headers (number, hash, parent_hash, state_root, timestamp) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
            )
            .bind(header.number as i64)
            .bind(hash_field(header.hash()))
            .bind(hash_field(header.parent_hash))
            .bind(hash_field(header.state_root))
            .bind(header.timestamp as i64)
            .execute(&self.pool)
            .await
        })?;
        Ok(())
    }

    fn begin(&self) -> Result<PgTx, PublishError> {
        let tx = self.runtime.block_on(self.pool.begin())?;
        Ok(PgTx {
            handle: self.runtime.handle().clone(),
            tx: Some(tx),
        })
    }
}

pub struct PgTx {
    handle: Handle,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn inner(&mut self) -> Result<&mut Transaction<'static, Postgres>, PublishError> {
        self.tx
            .as_mut()
            .ok_or_else(|| PublishError::Rejected("transaction already closed".into()))
    }
}

impl PublisherTx for PgTx {
    fn publish_state_node(
        &mut self,
        node: &StateNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError> {
        let handle = self.handle.clone();
        let query = sqlx::query(
            "INSERT INTO state_nodes \
             (header_hash, header_number, path, kind, node_hash, leaf_key, encoded) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT DO NOTHING",
        )
        .bind(hash_field(header_hash))
        .bind(header_number as i64)
        .bind(node.path.to_hex())
        .bind(node.kind.as_str())
        .bind(hash_field(node.hash))
        .bind(node.leaf_key.as_ref().map(|k| k.to_hex()))
        .bind(node.encoded.clone());
        let tx = self.inner()?;
        handle.block_on(query.execute(&mut **tx))?;
        Ok(())
    }

    fn publish_storage_node(
        &mut self,
        node: &StorageNode,
        header_hash: H256,
        header_number: u64,
    ) -> Result<(), PublishError> {
        let handle = self.handle.clone();
        let query = sqlx::query(
            "INSERT INTO storage_nodes \
             (header_hash, header_number, account_path, path, kind, node_hash, leaf_key, encoded) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT DO NOTHING",
        )
        .bind(hash_field(header_hash))
        .bind(header_number as i64)
        .bind(node.account_path.to_hex())
        .bind(node.path.to_hex())
        .bind(node.kind.as_str())
        .bind(hash_field(node.hash))
        .bind(node.leaf_key.as_ref().map(|k| k.to_hex()))
        .bind(node.encoded.clone());
        let tx = self.inner()?;
        handle.block_on(query.execute(&mut **tx))?;
        Ok(())
    }

    fn publish_code(
        &mut self,
        header_number: u64,
        code_hash: H256,
        code: &[u8],
    ) -> Result<(), PublishError> {
        let handle = self.handle.clone();
        let query = sqlx::query(
            "INSERT INTO code (header_number, code_hash, code) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(header_number as i64)
        .bind(hash_field(code_hash))
        .bind(code.to_vec());
        let tx = self.inner()?;
        handle.block_on(query.execute(&mut **tx))?;
        Ok(())
    }

    fn commit(mut self) -> Result<(), PublishError> {
        if let Some(tx) = self.tx.take() {
            self.handle.block_on(tx.commit())?;
        }
        Ok(())
    }
}
