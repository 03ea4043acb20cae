//! Stateful syncer
//!
//! Wraps the stateless [`Syncer`] engine with durable state: it resumes from
//! whatever block storage holds after a restart, seeds the engine's reorg
//! window from storage, and turns the engine's add/remove decisions into
//! storage writes, event log lines and counter updates.

use std::sync::Arc;

use async_trait::async_trait;
use chainsync_common::error::{ErrorContext, Result, SyncError};
use chainsync_common::traits::{
    BlockSource, BlockStore, BlockWorker, CounterStore, EventLogger, BLOCK_COUNTER,
    OPERATION_COUNTER, ORPHAN_COUNTER, TRANSACTION_COUNTER,
};
use chainsync_common::types::{
    Block, BlockIdentifier, NetworkIdentifier, NetworkStatusResponse, PartialBlockIdentifier,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{Handler, Helper, Syncer, DEFAULT_CONCURRENCY};

pub struct StatefulSyncer {
    network: NetworkIdentifier,
    fetcher: Arc<dyn BlockSource>,
    pub(crate) block_storage: Arc<dyn BlockStore>,
    counter_storage: Arc<dyn CounterStore>,
    logger: Arc<dyn EventLogger>,
    workers: Vec<Arc<dyn BlockWorker>>,
    pub(crate) cancel: CancellationToken,
    concurrency: usize,
}

impl StatefulSyncer {
    pub fn new(
        network: NetworkIdentifier,
        fetcher: Arc<dyn BlockSource>,
        block_storage: Arc<dyn BlockStore>,
        counter_storage: Arc<dyn CounterStore>,
        logger: Arc<dyn EventLogger>,
        workers: Vec<Arc<dyn BlockWorker>>,
    ) -> Self {
        Self {
            network,
            fetcher,
            block_storage,
            counter_storage,
            logger,
            workers,
            cancel: CancellationToken::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Ties this syncer's run to `parent`: cancelling the parent cancels the run,
    /// but the syncer cancelling itself leaves the parent untouched.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Stops the current run at its next checkpoint. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A handle that observes (and may trigger) this syncer's cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs a sync from `start_index` through `end_index` after reconciling storage.
    ///
    /// `start_index == -1` resumes after the stored head (or from genesis when
    /// storage is empty). Any other value discards stored blocks at or above it
    /// first. `end_index == -1` syncs until cancelled.
    pub async fn sync(&self, start_index: i64, end_index: i64) -> Result<()> {
        if start_index < -1 {
            return Err(SyncError::Config(format!("invalid start index {}", start_index)));
        }

        self.block_storage.initialize(self.workers.clone()).await;

        let mut start_index = start_index;
        if start_index != -1 {
            self.block_storage
                .set_new_start_index(start_index)
                .await
                .with_context(|| "unable to set new start index".to_string())?;
        } else {
            match self.block_storage.get_head_block_identifier().await {
                Ok(head) => start_index = head.index + 1,
                Err(e) if e.is_head_not_found() => {
                    debug!("No stored blocks, starting from the default start index");
                }
                Err(e) => {
                    warn!("Unable to load head block, starting from the default start index: {}", e);
                }
            }
        }

        // An empty cache means the engine will not attempt a reorg on its first block.
        let past_blocks = self.block_storage.create_block_cache().await;
        info!(
            network = %self.network,
            start_index,
            end_index,
            cached_blocks = past_blocks.len(),
            "Starting stateful sync"
        );

        let mut syncer = Syncer::new(self.network.clone(), self, self, self.cancel.clone())
            .with_concurrency(self.concurrency)
            .with_past_blocks(past_blocks);

        syncer.sync(start_index, end_index).await
    }

    async fn update_counter(&self, counter: &str, delta: i64) {
        if let Err(e) = self.counter_storage.update(counter, delta).await {
            debug!(counter, delta, "Unable to update counter: {}", e);
        }
    }
}

#[async_trait]
impl Handler for StatefulSyncer {
    async fn block_added(&self, block: &Block) -> Result<()> {
        let id = &block.block_identifier;
        self.block_storage
            .add_block(block)
            .await
            .with_context(|| format!("unable to add block to storage {}:{}", id.hash, id.index))?;

        if let Err(e) = self.logger.add_block_stream(block).await {
            warn!(index = id.index, hash = %id.hash, "Unable to log block addition: {}", e);
        }

        self.update_counter(BLOCK_COUNTER, 1).await;
        self.update_counter(TRANSACTION_COUNTER, block.transactions.len() as i64).await;
        self.update_counter(OPERATION_COUNTER, block.operation_count() as i64).await;

        Ok(())
    }

    async fn block_removed(&self, block_identifier: &BlockIdentifier) -> Result<()> {
        self.block_storage
            .remove_block(block_identifier)
            .await
            .with_context(|| {
                format!(
                    "unable to remove block from storage {}:{}",
                    block_identifier.hash, block_identifier.index
                )
            })?;

        if let Err(e) = self.logger.remove_block_stream(block_identifier).await {
            warn!(
                index = block_identifier.index,
                hash = %block_identifier.hash,
                "Unable to log block removal: {}",
                e
            );
        }

        self.update_counter(ORPHAN_COUNTER, 1).await;

        Ok(())
    }
}

#[async_trait]
impl Helper for StatefulSyncer {
    async fn network_status(&self, network: &NetworkIdentifier) -> Result<NetworkStatusResponse> {
        self.fetcher.network_status_retry(network).await
    }

    async fn block(
        &self,
        network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Option<Block>> {
        self.fetcher.block_retry(network, block).await
    }
}
