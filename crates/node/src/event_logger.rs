//! Append-only text log of block additions and removals.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chainsync_common::error::Result;
use chainsync_common::traits::EventLogger;
use chainsync_common::types::{Block, BlockIdentifier};
use serde::Deserialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const BLOCK_STREAM_FILE: &str = "blocks.txt";
pub const TRANSACTION_STREAM_FILE: &str = "transactions.txt";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventLogConfig {
    /// Directory the stream files are written to. No directory disables logging.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub log_blocks: bool,
    #[serde(default)]
    pub log_transactions: bool,
}

pub struct FileEventLogger {
    directory: Option<PathBuf>,
    log_blocks: bool,
    log_transactions: bool,
    /// Keeps lines from concurrent writers intact.
    write_lock: Mutex<()>,
}

impl FileEventLogger {
    pub fn new(config: &EventLogConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            log_blocks: config.log_blocks,
            log_transactions: config.log_transactions,
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&EventLogConfig::default())
    }

    fn stream_path(&self, file: &str) -> Option<PathBuf> {
        self.directory.as_deref().map(|dir| dir.join(file))
    }

    async fn append(&self, path: &Path, text: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EventLogger for FileEventLogger {
    async fn add_block_stream(&self, block: &Block) -> Result<()> {
        let id = &block.block_identifier;

        if self.log_blocks {
            if let Some(path) = self.stream_path(BLOCK_STREAM_FILE) {
                let line = format!(
                    "Add block {}:{} with {} transactions\n",
                    id.index,
                    id.hash,
                    block.transactions.len()
                );
                self.append(&path, &line).await?;
            }
        }

        if self.log_transactions && !block.transactions.is_empty() {
            if let Some(path) = self.stream_path(TRANSACTION_STREAM_FILE) {
                let mut text = String::new();
                for tx in &block.transactions {
                    text.push_str(&format!(
                        "Transaction {} at {}:{} with {} operations\n",
                        tx.transaction_identifier.hash,
                        id.index,
                        id.hash,
                        tx.operations.len()
                    ));
                }
                self.append(&path, &text).await?;
            }
        }

        Ok(())
    }

    async fn remove_block_stream(&self, block_identifier: &BlockIdentifier) -> Result<()> {
        if !self.log_blocks {
            return Ok(());
        }

        match self.stream_path(BLOCK_STREAM_FILE) {
            Some(path) => {
                let line = format!(
                    "Remove block {}:{}\n",
                    block_identifier.index, block_identifier.hash
                );
                self.append(&path, &line).await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsync_common::types::{Operation, Transaction, TransactionIdentifier};
    use tempfile::TempDir;

    fn sample_block() -> Block {
        Block {
            block_identifier: BlockIdentifier::new(7, "b7"),
            parent_block_identifier: BlockIdentifier::new(6, "b6"),
            timestamp: 0,
            transactions: vec![Transaction {
                transaction_identifier: TransactionIdentifier { hash: "t1".to_string() },
                operations: vec![Operation::default(), Operation::default()],
                metadata: None,
            }],
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_writes_block_and_transaction_streams() {
        let dir = TempDir::new().unwrap();
        let logger = FileEventLogger::new(&EventLogConfig {
            directory: Some(dir.path().to_path_buf()),
            log_blocks: true,
            log_transactions: true,
        });

        logger.add_block_stream(&sample_block()).await.unwrap();
        logger.remove_block_stream(&BlockIdentifier::new(7, "b7")).await.unwrap();

        let blocks = std::fs::read_to_string(dir.path().join(BLOCK_STREAM_FILE)).unwrap();
        assert_eq!(blocks, "Add block 7:b7 with 1 transactions\nRemove block 7:b7\n");

        let txs = std::fs::read_to_string(dir.path().join(TRANSACTION_STREAM_FILE)).unwrap();
        assert_eq!(txs, "Transaction t1 at 7:b7 with 2 operations\n");
    }

    #[tokio::test]
    async fn test_disabled_logger_writes_nothing() {
        let logger = FileEventLogger::disabled();
        logger.add_block_stream(&sample_block()).await.unwrap();
        logger.remove_block_stream(&BlockIdentifier::new(7, "b7")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let logger = FileEventLogger::new(&EventLogConfig {
            directory: Some(blocker),
            log_blocks: true,
            log_transactions: false,
        });

        assert!(logger.add_block_stream(&sample_block()).await.is_err());
    }
}
