use anyhow::Result;
use async_trait::async_trait;
use chainsync_common::traits::{BatchOp, DBInterface, WriteBatch};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Volatile backend for tests and dry runs.
#[derive(Default)]
pub struct MemoryDB {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDB {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DBInterface for MemoryDB {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().await.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut entries = self.entries.write().await;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
