use anyhow::{Context, Result};
use async_trait::async_trait;
use chainsync_common::traits::{BatchOp, DBInterface, WriteBatch};
use sled::Tree;
use std::path::Path;
use std::sync::Arc;

pub struct SledDB {
    db: Arc<Tree>,
}

impl SledDB {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).context("Failed to open Sled database")?;
        Self::from_db(db)
    }

    /// Create a new SledDB instance from an existing sled::Db
    pub fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree("chainsync").context("Failed to open chainsync tree")?;
        Ok(Self {
            db: Arc::new(tree),
        })
    }

    /// Blocks until every pending write has reached disk.
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Failed to flush SledDB: {}", e))
    }
}

#[async_trait]
impl DBInterface for SledDB {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || {
            match db.get(&key) {
                Ok(Some(value)) => Ok(Some(value.to_vec())),
                Ok(None) => Ok(None),
                Err(e) => Err(anyhow::anyhow!("Failed to get from SledDB: {}", e)),
            }
        }).await?
    }

    async fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_vec();
        let value = value.to_vec();

        tokio::task::spawn_blocking(move || {
            db.insert(key.as_slice(), value.as_slice())
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!("Failed to insert into SledDB: {}", e))
        }).await?
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || {
            db.remove(key.as_slice())
                .map(|_| ())
                .map_err(|e| anyhow::anyhow!("Failed to remove from SledDB: {}", e))
        }).await?
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || {
            let mut sled_batch = sled::Batch::default();
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put(key, value) => sled_batch.insert(key, value),
                    BatchOp::Delete(key) => sled_batch.remove(key),
                }
            }
            db.apply_batch(sled_batch)
                .map_err(|e| anyhow::anyhow!("Failed to apply batch to SledDB: {}", e))
        }).await?
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let db = self.db.clone();
        let prefix = prefix.to_vec();

        tokio::task::spawn_blocking(move || {
            db.scan_prefix(&prefix)
                .map(|res| {
                    res.map(|(k, v)| (k.to_vec(), v.to_vec()))
                        .map_err(|e| anyhow::anyhow!("DB iteration error: {}", e))
                })
                .collect::<Result<Vec<_>>>()
        }).await?
    }
}
