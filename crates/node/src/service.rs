use anyhow::{Context, Result};
use chainsync_common::traits::{
    BlockWorker, CounterStore, DBInterface, BLOCK_COUNTER, OPERATION_COUNTER, ORPHAN_COUNTER,
    TRANSACTION_COUNTER,
};
use chainsync_fetcher::Fetcher;
use chainsync_storage::{BlockStorage, CounterStorage, SledDB, TransactionIndexWorker};
use std::sync::Arc;
use crate::config::NodeConfig;
use crate::event_logger::FileEventLogger;
use crate::syncer::StatefulSyncer;
use tokio::signal;
use tracing::{info, warn};

pub const COUNTERS: [&str; 4] = [BLOCK_COUNTER, TRANSACTION_COUNTER, OPERATION_COUNTER, ORPHAN_COUNTER];

pub struct SyncNode {
    config: NodeConfig,
    db: Arc<SledDB>,
    counters: Arc<CounterStorage>,
    syncer: Arc<StatefulSyncer>,
}

impl SyncNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let db = Arc::new(SledDB::new(&config.data_dir)?);
        let kv: Arc<dyn DBInterface> = db.clone();

        let block_storage = Arc::new(BlockStorage::with_cache_size(kv.clone(), config.block_cache_size));
        let counters = Arc::new(CounterStorage::new(kv.clone()));
        let workers: Vec<Arc<dyn BlockWorker>> = vec![Arc::new(TransactionIndexWorker::new(kv))];

        let fetcher = Arc::new(Fetcher::new(&config.fetcher_config()).context("Failed to build fetcher")?);
        let logger = Arc::new(FileEventLogger::new(&config.event_log));

        let syncer = StatefulSyncer::new(
            config.network.clone(),
            fetcher,
            block_storage,
            counters.clone(),
            logger,
            workers,
        )
        .with_concurrency(config.sync_concurrency);

        Ok(Self {
            config,
            db,
            counters,
            syncer: Arc::new(syncer),
        })
    }

    pub fn syncer(&self) -> &Arc<StatefulSyncer> {
        &self.syncer
    }

    /// Syncs until `end_index`, an end condition, or ctrl-c; whichever comes first.
    pub async fn run(&self, start_index: i64, end_index: i64) -> Result<()> {
        info!(network = %self.config.network, url = %self.config.online_url, "Starting sync node");

        let watchdogs = self.syncer.spawn_end_conditions(&self.config.end_conditions);

        let syncer = self.syncer.clone();
        let shutdown = tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                syncer.cancel();
            }
        });

        let result = self.syncer.sync(start_index, end_index).await;

        // Releases the watchdogs when the sync ended on its own.
        self.syncer.cancel();
        shutdown.abort();
        for watchdog in watchdogs {
            if let Err(e) = watchdog.await {
                warn!("End condition task failed: {}", e);
            }
        }

        if let Err(e) = self.db.flush().await {
            warn!("Unable to flush database: {}", e);
        }
        match self.counter_values().await {
            Ok(values) => {
                for (name, value) in values {
                    info!(counter = name, value, "Sync counter");
                }
            }
            Err(e) => warn!("Unable to read sync counters: {}", e),
        }

        result.context("Sync failed")
    }

    pub async fn counter_values(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut values = Vec::with_capacity(COUNTERS.len());
        for name in COUNTERS {
            values.push((name, self.counters.get(name).await?));
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline_config(dir: &TempDir) -> NodeConfig {
        serde_json::from_value(serde_json::json!({
            "network": {"blockchain": "bitcoin", "network": "testnet3"},
            "online_url": "http://127.0.0.1:1",
            "data_dir": dir.path().join("db").to_string_lossy(),
            "retry": {"timeout_secs": 1, "max_retries": 1, "initial_backoff_ms": 1, "max_backoff_ms": 1}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_returns_sync_error() {
        let dir = TempDir::new().unwrap();
        let node = SyncNode::new(offline_config(&dir)).unwrap();

        let err = node.run(-2, 5).await.unwrap_err();
        assert!(format!("{:#}", err).contains("invalid start index -2"), "{:#}", err);
        assert!(node.syncer().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_surfaces_fetch_failure_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let node = SyncNode::new(offline_config(&dir)).unwrap();

        let err = node.run(-1, 5).await.unwrap_err();
        assert!(format!("{:#}", err).contains("gave up after 2 attempts"), "{:#}", err);
        assert!(node.counter_values().await.unwrap().iter().all(|(_, v)| *v == 0));
    }
}
