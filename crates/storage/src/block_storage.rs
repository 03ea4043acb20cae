//! Block storage
//!
//! Keeps the synced chain as a linked run of blocks ending at a head pointer.
//! Only the head may be removed and only a child of the head may be added, so
//! the stored chain is always contiguous.

use std::sync::Arc;

use async_trait::async_trait;
use chainsync_common::error::{Result, StorageError, SyncError};
use chainsync_common::traits::{BlockStore, BlockWorker, DBInterface, WriteBatch};
use chainsync_common::types::{Block, BlockIdentifier};
use chainsync_common::utils::{codec, db_keys};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Number of recent blocks handed to the syncer on startup.
pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 20;

const MILLISECONDS_IN_SECOND: i64 = 1000;

pub struct BlockStorage {
    db: Arc<dyn DBInterface>,
    workers: RwLock<Vec<Arc<dyn BlockWorker>>>,
    cache_size: usize,
    /// Serializes head updates.
    write_lock: Mutex<()>,
}

impl BlockStorage {
    pub fn new(db: Arc<dyn DBInterface>) -> Self {
        Self::with_cache_size(db, DEFAULT_BLOCK_CACHE_SIZE)
    }

    pub fn with_cache_size(db: Arc<dyn DBInterface>, cache_size: usize) -> Self {
        Self {
            db,
            workers: RwLock::new(Vec::new()),
            cache_size,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get_block(&self, block_identifier: &BlockIdentifier) -> Result<Block> {
        let raw = self
            .db
            .get(&db_keys::block_hash_to_db_key(&block_identifier.hash))
            .await
            .map_err(database_error)?
            .ok_or_else(|| StorageError::BlockNotFound(block_identifier.to_string()))?;

        let block: Block = codec::deserialize(&raw)?;
        if block.block_identifier.index != block_identifier.index {
            return Err(StorageError::BlockNotFound(block_identifier.to_string()).into());
        }
        Ok(block)
    }

    pub async fn get_block_by_index(&self, index: i64) -> Result<Block> {
        let hash = self
            .db
            .get(&db_keys::block_index_to_db_key(index))
            .await
            .map_err(database_error)?
            .ok_or_else(|| StorageError::BlockNotFound(format!("index {}", index)))?;

        let hash = String::from_utf8(hash)
            .map_err(|e| StorageError::Corruption(format!("index {} hash: {}", index, e)))?;
        self.get_block(&BlockIdentifier::new(index, hash)).await
    }

    pub async fn get_head_block(&self) -> Result<Block> {
        let head = self.get_head_block_identifier().await?;
        self.get_block(&head).await
    }

    async fn has_block(&self, hash: &str) -> Result<bool> {
        Ok(self
            .db
            .get(&db_keys::block_hash_to_db_key(hash))
            .await
            .map_err(database_error)?
            .is_some())
    }

    /// Head identifier, or `None` for an empty store.
    async fn head_if_any(&self) -> Result<Option<BlockIdentifier>> {
        match self.get_head_block_identifier().await {
            Ok(head) => Ok(Some(head)),
            Err(e) if e.is_head_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BlockStore for BlockStorage {
    async fn initialize(&self, workers: Vec<Arc<dyn BlockWorker>>) {
        debug!(workers = workers.len(), "Initializing block storage workers");
        *self.workers.write().await = workers;
    }

    async fn set_new_start_index(&self, start_index: i64) -> Result<()> {
        if start_index < 0 {
            return Err(StorageError::NegativeStartIndex(start_index).into());
        }

        let head = match self.head_if_any().await? {
            Some(head) => head,
            None => return Ok(()),
        };

        // Starting past head + 1 would leave a gap the next block cannot link to.
        if head.index + 1 < start_index {
            return Err(StorageError::StartIndexAhead {
                head: head.index,
                start: start_index,
            }
            .into());
        }

        let mut current = head;
        let mut removed = 0u64;
        while current.index >= start_index {
            self.remove_block(&current).await?;
            removed += 1;

            current = match self.head_if_any().await? {
                Some(next) => next,
                None => break,
            };
        }

        info!(start_index, removed, "Rewound block storage");
        Ok(())
    }

    async fn get_head_block_identifier(&self) -> Result<BlockIdentifier> {
        let raw = self
            .db
            .get(db_keys::HEAD_BLOCK_KEY)
            .await
            .map_err(database_error)?
            .ok_or(StorageError::HeadBlockNotFound)?;

        codec::deserialize(&raw)
    }

    async fn create_block_cache(&self) -> Vec<Block> {
        let head = match self.head_if_any().await {
            Ok(Some(head)) => head,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Unable to load head block for cache: {}", e);
                return Vec::new();
            }
        };

        let oldest = (head.index - self.cache_size as i64 + 1).max(0);
        let mut cache = Vec::with_capacity(self.cache_size);
        for index in oldest..=head.index {
            match self.get_block_by_index(index).await {
                Ok(block) => cache.push(block),
                // Stores seeded above genesis have no blocks below their first index.
                Err(SyncError::Storage(StorageError::BlockNotFound(_))) => continue,
                Err(e) => {
                    warn!("Unable to load block {} for cache: {}", index, e);
                    return Vec::new();
                }
            }
        }

        cache
    }

    async fn add_block(&self, block: &Block) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let id = &block.block_identifier;

        if self.has_block(&id.hash).await? {
            return Err(StorageError::DuplicateBlock(id.to_string()).into());
        }

        if let Some(head) = self.head_if_any().await? {
            if block.parent_block_identifier != head {
                return Err(StorageError::NotChildOfHead {
                    block: id.to_string(),
                    head: head.to_string(),
                }
                .into());
            }
        }

        let mut batch = WriteBatch::new();
        batch.put(db_keys::block_hash_to_db_key(&id.hash), codec::serialize(block)?);
        batch.put(db_keys::block_index_to_db_key(id.index), id.hash.as_bytes().to_vec());
        batch.put(db_keys::HEAD_BLOCK_KEY, codec::serialize(id)?);

        for worker in self.workers.read().await.iter() {
            worker.adding_block(block, &mut batch).await?;
        }

        self.db.write_batch(batch).await.map_err(database_error)?;
        debug!(index = id.index, hash = %id.hash, "Stored block");
        Ok(())
    }

    async fn remove_block(&self, block_identifier: &BlockIdentifier) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let head = self.get_head_block_identifier().await?;
        if &head != block_identifier {
            return Err(StorageError::NotHead {
                block: block_identifier.to_string(),
                head: head.to_string(),
            }
            .into());
        }

        let block = self.get_block(block_identifier).await?;
        let parent = &block.parent_block_identifier;

        let mut batch = WriteBatch::new();
        batch.delete(db_keys::block_hash_to_db_key(&block_identifier.hash));
        batch.delete(db_keys::block_index_to_db_key(block_identifier.index));

        if !block.is_genesis() && self.has_block(&parent.hash).await? {
            batch.put(db_keys::HEAD_BLOCK_KEY, codec::serialize(parent)?);
        } else {
            batch.delete(db_keys::HEAD_BLOCK_KEY);
        }

        for worker in self.workers.read().await.iter() {
            worker.removing_block(&block, &mut batch).await?;
        }

        self.db.write_batch(batch).await.map_err(database_error)?;
        debug!(index = block_identifier.index, hash = %block_identifier.hash, "Removed block");
        Ok(())
    }

    async fn at_tip(&self, tip_delay: i64) -> Result<bool> {
        let head = match self.head_if_any().await? {
            Some(head) => self.get_block(&head).await?,
            None => return Ok(false),
        };

        let tip_cutoff = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(tip_delay.saturating_mul(MILLISECONDS_IN_SECOND));
        Ok(head.timestamp >= tip_cutoff)
    }
}

fn database_error(err: anyhow::Error) -> SyncError {
    StorageError::Database(err.to_string()).into()
}
