//! Storage workers run inside block storage writes.

use std::sync::Arc;

use async_trait::async_trait;
use chainsync_common::error::{Result, StorageError};
use chainsync_common::traits::{BlockWorker, DBInterface, WriteBatch};
use chainsync_common::types::{Block, BlockIdentifier};
use chainsync_common::utils::{codec, db_keys};

/// Indexes every transaction hash to the block that carries it.
pub struct TransactionIndexWorker {
    db: Arc<dyn DBInterface>,
}

impl TransactionIndexWorker {
    pub fn new(db: Arc<dyn DBInterface>) -> Self {
        Self { db }
    }

    /// Blocks currently stored that include the transaction.
    pub async fn find_transaction(&self, tx_hash: &str) -> Result<Vec<BlockIdentifier>> {
        let entries = self
            .db
            .scan_prefix(&db_keys::tx_hash_prefix(tx_hash))
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        entries
            .iter()
            .map(|(_, value)| codec::deserialize::<BlockIdentifier>(value))
            .collect()
    }
}

#[async_trait]
impl BlockWorker for TransactionIndexWorker {
    async fn adding_block(&self, block: &Block, batch: &mut WriteBatch) -> Result<()> {
        let value = codec::serialize(&block.block_identifier)?;
        for tx in &block.transactions {
            batch.put(
                db_keys::tx_hash_to_db_key(&tx.transaction_identifier.hash, &block.block_identifier),
                value.clone(),
            );
        }
        Ok(())
    }

    async fn removing_block(&self, block: &Block, batch: &mut WriteBatch) -> Result<()> {
        for tx in &block.transactions {
            batch.delete(db_keys::tx_hash_to_db_key(
                &tx.transaction_identifier.hash,
                &block.block_identifier,
            ));
        }
        Ok(())
    }
}
