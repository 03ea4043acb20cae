use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Block, BlockIdentifier, NetworkIdentifier, NetworkStatusResponse, PartialBlockIdentifier};

/// Raw key-value backend underneath the block and counter stores.
#[async_trait]
pub trait DBInterface: Send + Sync {
    async fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;
    async fn insert(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()>;
    async fn remove(&self, key: &[u8]) -> anyhow::Result<()>;
    /// Applies every put and delete in the batch atomically.
    async fn write_batch(&self, batch: WriteBatch) -> anyhow::Result<()>;
    async fn scan_prefix(&self, prefix: &[u8]) -> anyhow::Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// An ordered set of writes applied as one unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Storage-side observer of block additions and removals.
///
/// Workers stage their own writes into the same batch as the block so that
/// their side effects commit or fail together with it.
#[async_trait]
pub trait BlockWorker: Send + Sync {
    async fn adding_block(&self, block: &Block, batch: &mut WriteBatch) -> Result<()>;
    async fn removing_block(&self, block: &Block, batch: &mut WriteBatch) -> Result<()>;
}

/// Durable, ordered store of synced blocks.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Replaces the set of workers notified on every add and remove.
    async fn initialize(&self, workers: Vec<Arc<dyn BlockWorker>>);

    /// Discards every stored block with index >= `start_index`.
    async fn set_new_start_index(&self, start_index: i64) -> Result<()>;

    async fn get_head_block_identifier(&self) -> Result<BlockIdentifier>;

    /// Most recently stored blocks, oldest first. Empty when nothing is stored.
    async fn create_block_cache(&self) -> Vec<Block>;

    async fn add_block(&self, block: &Block) -> Result<()>;

    async fn remove_block(&self, block_identifier: &BlockIdentifier) -> Result<()>;

    /// Whether the head block is at most `tip_delay` seconds old.
    async fn at_tip(&self, tip_delay: i64) -> Result<bool>;
}

pub const BLOCK_COUNTER: &str = "blocks";
pub const TRANSACTION_COUNTER: &str = "transactions";
pub const OPERATION_COUNTER: &str = "operations";
pub const ORPHAN_COUNTER: &str = "orphans";

/// Durable named counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Adds `delta` to the counter and returns the new value.
    async fn update(&self, counter: &str, delta: i64) -> Result<i64>;
    async fn get(&self, counter: &str) -> Result<i64>;
}

/// Best-effort stream of block additions and removals.
#[async_trait]
pub trait EventLogger: Send + Sync {
    async fn add_block_stream(&self, block: &Block) -> Result<()>;
    async fn remove_block_stream(&self, block_identifier: &BlockIdentifier) -> Result<()>;
}

/// Remote node answering status and block requests, retrying internally.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn network_status_retry(&self, network: &NetworkIdentifier) -> Result<NetworkStatusResponse>;

    /// `Ok(None)` means the node deliberately omits a block at that index.
    async fn block_retry(
        &self,
        network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Option<Block>>;
}
