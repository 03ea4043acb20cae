//! Block sync engine
//!
//! Walks the chain index by index, fetching blocks concurrently and handing
//! them to a [`Handler`] strictly in order. A block whose parent does not match
//! the last block handed over triggers a rollback of that last block, after
//! which syncing resumes one index lower.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chainsync_common::error::{Result, SyncError};
use chainsync_common::types::{
    Block, BlockIdentifier, NetworkIdentifier, NetworkStatusResponse, PartialBlockIdentifier,
};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_PAST_BLOCK_LIMIT: usize = 20;
pub const DEFAULT_SYNC_SLEEP: Duration = Duration::from_secs(2);

/// Upper bound on the indices fetched per round, per unit of concurrency.
const BLOCKS_PER_WORKER: usize = 16;

/// Supplies network state and blocks to the engine.
#[async_trait]
pub trait Helper: Send + Sync {
    async fn network_status(&self, network: &NetworkIdentifier) -> Result<NetworkStatusResponse>;

    async fn block(
        &self,
        network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Option<Block>>;
}

/// Receives the engine's add and remove decisions. Any error aborts the sync.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn block_added(&self, block: &Block) -> Result<()>;
    async fn block_removed(&self, block_identifier: &BlockIdentifier) -> Result<()>;
}

/// What happened to the current round after handing over a block.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Advanced,
    Reorged,
}

pub struct Syncer<'a, H: ?Sized, D: ?Sized> {
    network: NetworkIdentifier,
    helper: &'a H,
    handler: &'a D,
    cancel: CancellationToken,
    concurrency: usize,
    sync_sleep: Duration,
    past_block_limit: usize,
    past_blocks: VecDeque<BlockIdentifier>,
    next_index: i64,
}

impl<'a, H, D> Syncer<'a, H, D>
where
    H: Helper + ?Sized,
    D: Handler + ?Sized,
{
    pub fn new(
        network: NetworkIdentifier,
        helper: &'a H,
        handler: &'a D,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            network,
            helper,
            handler,
            cancel,
            concurrency: DEFAULT_CONCURRENCY,
            sync_sleep: DEFAULT_SYNC_SLEEP,
            past_block_limit: DEFAULT_PAST_BLOCK_LIMIT,
            past_blocks: VecDeque::new(),
            next_index: -1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_sync_sleep(mut self, sync_sleep: Duration) -> Self {
        self.sync_sleep = sync_sleep;
        self
    }

    pub fn with_past_block_limit(mut self, limit: usize) -> Self {
        self.past_block_limit = limit.max(1);
        self.trim_past_blocks();
        self
    }

    /// Seeds reorg detection with blocks processed before a restart, oldest first.
    pub fn with_past_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.past_blocks = blocks.into_iter().map(|b| b.block_identifier).collect();
        self.trim_past_blocks();
        self
    }

    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    /// Syncs from `start_index` (-1 = genesis) through `end_index` (-1 = forever).
    ///
    /// Returns `Ok(())` when `end_index` is reached or the token is cancelled.
    pub async fn sync(&mut self, start_index: i64, end_index: i64) -> Result<()> {
        if !self.set_start(start_index).await? {
            return Ok(());
        }
        info!(start = self.next_index, end = end_index, "Syncing blocks");

        loop {
            if self.cancel.is_cancelled() {
                info!(next_index = self.next_index, "Sync cancelled");
                return Ok(());
            }

            let range_end = match self.next_syncable_range(end_index).await? {
                Some(range_end) => range_end,
                None if self.cancel.is_cancelled() => continue,
                None if end_index != -1 && self.next_index > end_index => break,
                None => {
                    debug!(next_index = self.next_index, "Caught up with network, waiting");
                    let sleep = tokio::time::sleep(self.sync_sleep);
                    self.until_cancelled(sleep).await;
                    continue;
                }
            };

            self.sync_range(range_end).await?;
        }

        info!(end = end_index, "Finished syncing blocks");
        Ok(())
    }

    /// Returns false if cancelled before a start could be determined.
    async fn set_start(&mut self, start_index: i64) -> Result<bool> {
        if start_index != -1 {
            self.next_index = start_index;
            return Ok(true);
        }

        match self.until_cancelled(self.helper.network_status(&self.network)).await {
            Some(status) => {
                self.next_index = status?.genesis_block_identifier.index;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Last index to fetch this round, or `None` when nothing is syncable yet.
    async fn next_syncable_range(&self, end_index: i64) -> Result<Option<i64>> {
        if self.next_index < 0 {
            return Err(SyncError::Syncer("start index was never resolved".to_string()));
        }

        let status = match self.until_cancelled(self.helper.network_status(&self.network)).await {
            Some(status) => status?,
            None => return Ok(None),
        };

        let mut end = status.current_block_identifier.index;
        if end_index != -1 && end_index < end {
            end = end_index;
        }
        if self.next_index > end {
            return Ok(None);
        }

        let max_round = (self.concurrency * BLOCKS_PER_WORKER) as i64;
        Ok(Some(end.min(self.next_index + max_round - 1)))
    }

    async fn sync_range(&mut self, range_end: i64) -> Result<()> {
        let helper = self.helper;
        let network = self.network.clone();
        let network = &network;

        let mut blocks = stream::iter(self.next_index..=range_end)
            .map(|index| async move {
                let block = helper.block(network, &PartialBlockIdentifier::at_index(index)).await;
                (index, block)
            })
            .buffered(self.concurrency);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                next = blocks.next() => next,
            };

            let (index, block) = match next {
                Some(fetched) => fetched,
                None => return Ok(()),
            };
            let block = block.map_err(|e| SyncError::Context {
                context: format!("unable to fetch block {}", index),
                source: Box::new(e),
            })?;

            if self.process_block(index, block).await? == Step::Reorged {
                // Remaining fetched blocks build on the removed one.
                return Ok(());
            }
        }
    }

    async fn process_block(&mut self, index: i64, block: Option<Block>) -> Result<Step> {
        let block = match block {
            Some(block) => block,
            None => {
                debug!(index, "Skipping omitted block");
                self.next_index = index + 1;
                return Ok(Step::Advanced);
            }
        };

        if block.block_identifier.index != self.next_index {
            return Err(SyncError::Syncer(format!(
                "got block {} instead of index {}",
                block.block_identifier, self.next_index
            )));
        }

        if let Some(last) = self.past_blocks.back().cloned() {
            if block.parent_block_identifier != last {
                warn!(
                    removed = %last,
                    incoming = %block.block_identifier,
                    "Parent mismatch, rolling back last block"
                );
                self.handler.block_removed(&last).await?;
                self.past_blocks.pop_back();
                self.next_index = last.index;
                return Ok(Step::Reorged);
            }
        }

        self.handler.block_added(&block).await?;
        self.next_index = block.block_identifier.index + 1;
        self.past_blocks.push_back(block.block_identifier);
        self.trim_past_blocks();
        Ok(Step::Advanced)
    }

    fn trim_past_blocks(&mut self) {
        while self.past_blocks.len() > self.past_block_limit {
            self.past_blocks.pop_front();
        }
    }

    /// Runs `fut` unless the token fires first; cancellation wins ties.
    async fn until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
