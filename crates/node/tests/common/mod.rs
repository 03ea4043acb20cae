#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chainsync_common::error::{Result, StorageError, SyncError};
use chainsync_common::traits::{BlockSource, BlockStore, BlockWorker, DBInterface, EventLogger};
use chainsync_common::types::{
    Block, BlockIdentifier, NetworkIdentifier, NetworkStatusResponse, Operation,
    PartialBlockIdentifier, Transaction, TransactionIdentifier,
};
use chainsync_node::StatefulSyncer;
use chainsync_storage::{BlockStorage, CounterStorage, MemoryDB, TransactionIndexWorker};

pub fn network() -> NetworkIdentifier {
    NetworkIdentifier {
        blockchain: "bitcoin".to_string(),
        network: "testnet3".to_string(),
    }
}

pub fn id(index: i64, fork: &str) -> BlockIdentifier {
    BlockIdentifier::new(index, format!("{}{}", fork, index))
}

/// One transaction with two operations per block; genesis is its own parent.
pub fn block(index: i64, fork: &str, parent_fork: &str) -> Block {
    let parent = if index == 0 { id(0, fork) } else { id(index - 1, parent_fork) };
    Block {
        block_identifier: id(index, fork),
        parent_block_identifier: parent,
        timestamp: 1_600_000_000_000 + index * 1000,
        transactions: vec![Transaction {
            transaction_identifier: TransactionIdentifier { hash: format!("tx-{}{}", fork, index) },
            operations: vec![Operation::default(), Operation::default()],
            metadata: None,
        }],
        metadata: None,
    }
}

/// Blocks `from..=to` of `fork`, the first one linked to `parent_fork`.
pub fn chain(from: i64, to: i64, fork: &str, parent_fork: &str) -> Vec<Block> {
    (from..=to)
        .map(|i| if i == from { block(i, fork, parent_fork) } else { block(i, fork, fork) })
        .collect()
}

/// Remote node serving a mutable chain and recording which indices were asked for.
pub struct ChainSource {
    blocks: Mutex<HashMap<i64, Block>>,
    tip: Mutex<i64>,
    requested: Mutex<Vec<i64>>,
}

impl ChainSource {
    pub fn new(blocks: Vec<Block>) -> Arc<Self> {
        let tip = blocks.iter().map(|b| b.block_identifier.index).max().unwrap_or(0);
        Arc::new(Self {
            blocks: Mutex::new(blocks.into_iter().map(|b| (b.block_identifier.index, b)).collect()),
            tip: Mutex::new(tip),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn requested(&self) -> Vec<i64> {
        let mut requested = self.requested.lock().unwrap().clone();
        requested.sort_unstable();
        requested
    }
}

#[async_trait]
impl BlockSource for ChainSource {
    async fn network_status_retry(&self, _network: &NetworkIdentifier) -> Result<NetworkStatusResponse> {
        let tip = *self.tip.lock().unwrap();
        let blocks = self.blocks.lock().unwrap();
        let current = blocks
            .get(&tip)
            .cloned()
            .ok_or_else(|| SyncError::Internal("tip missing".to_string()))?;
        let genesis = blocks
            .get(&0)
            .map(|b| b.block_identifier.clone())
            .unwrap_or_default();

        Ok(NetworkStatusResponse {
            current_block_identifier: current.block_identifier,
            current_block_timestamp: current.timestamp,
            genesis_block_identifier: genesis,
            oldest_block_identifier: None,
            peers: Vec::new(),
        })
    }

    async fn block_retry(
        &self,
        _network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Option<Block>> {
        let index = block
            .index
            .ok_or_else(|| SyncError::Internal("index required".to_string()))?;
        self.requested.lock().unwrap().push(index);
        self.blocks
            .lock()
            .unwrap()
            .get(&index)
            .cloned()
            .map(Some)
            .ok_or_else(|| SyncError::Internal(format!("no block at {}", index)))
    }
}

pub struct FailingLogger;

#[async_trait]
impl EventLogger for FailingLogger {
    async fn add_block_stream(&self, _block: &Block) -> Result<()> {
        Err(SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
    }

    async fn remove_block_stream(&self, _block_identifier: &BlockIdentifier) -> Result<()> {
        Err(SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
    }
}

/// Wraps real block storage with injectable failures.
pub struct FaultyStore {
    pub inner: Arc<BlockStorage>,
    pub fail_add: AtomicBool,
    pub fail_head: AtomicBool,
    pub fail_remove: AtomicBool,
    /// Answers for successive `at_tip` calls; `Ok(false)` once drained.
    pub tip_script: Mutex<VecDeque<Result<bool>>>,
    pub tip_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<BlockStorage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_add: AtomicBool::new(false),
            fail_head: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            tip_script: Mutex::new(VecDeque::new()),
            tip_calls: AtomicUsize::new(0),
        })
    }

    pub fn script_tip(&self, answers: Vec<Result<bool>>) {
        self.tip_script.lock().unwrap().extend(answers);
    }
}

fn injected() -> SyncError {
    StorageError::Database("injected failure".to_string()).into()
}

#[async_trait]
impl BlockStore for FaultyStore {
    async fn initialize(&self, workers: Vec<Arc<dyn BlockWorker>>) {
        self.inner.initialize(workers).await
    }

    async fn set_new_start_index(&self, start_index: i64) -> Result<()> {
        self.inner.set_new_start_index(start_index).await
    }

    async fn get_head_block_identifier(&self) -> Result<BlockIdentifier> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get_head_block_identifier().await
    }

    async fn create_block_cache(&self) -> Vec<Block> {
        self.inner.create_block_cache().await
    }

    async fn add_block(&self, block: &Block) -> Result<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.add_block(block).await
    }

    async fn remove_block(&self, block_identifier: &BlockIdentifier) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.remove_block(block_identifier).await
    }

    async fn at_tip(&self, _tip_delay: i64) -> Result<bool> {
        self.tip_calls.fetch_add(1, Ordering::SeqCst);
        self.tip_script.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }
}

/// Real storage and counters over one in-memory database.
pub struct Harness {
    pub db: Arc<dyn DBInterface>,
    pub storage: Arc<BlockStorage>,
    pub counters: Arc<CounterStorage>,
    pub tx_index: Arc<TransactionIndexWorker>,
}

impl Harness {
    pub fn new() -> Self {
        let db: Arc<dyn DBInterface> = Arc::new(MemoryDB::new());
        Self {
            storage: Arc::new(BlockStorage::new(db.clone())),
            counters: Arc::new(CounterStorage::new(db.clone())),
            tx_index: Arc::new(TransactionIndexWorker::new(db.clone())),
            db,
        }
    }

    pub async fn seed(&self, blocks: &[Block]) {
        for block in blocks {
            self.storage.add_block(block).await.unwrap();
        }
    }

    pub fn syncer(
        &self,
        source: Arc<dyn BlockSource>,
        store: Arc<dyn BlockStore>,
        logger: Arc<dyn EventLogger>,
    ) -> StatefulSyncer {
        StatefulSyncer::new(
            network(),
            source,
            store,
            self.counters.clone(),
            logger,
            vec![self.tx_index.clone() as Arc<dyn BlockWorker>],
        )
        .with_concurrency(4)
    }
}
