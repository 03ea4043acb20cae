use serde::Deserialize;
use chainsync_common::types::NetworkIdentifier;
use chainsync_fetcher::FetcherConfig;

use crate::event_logger::EventLogConfig;
use crate::logging::LoggingConfig;
use crate::syncer::engine::DEFAULT_CONCURRENCY;
use crate::syncer::EndConditions;

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub network: NetworkIdentifier,
    /// Data API endpoint of the node being synced.
    pub online_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_sync_concurrency")]
    pub sync_concurrency: usize,
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,
    /// -1 resumes after the stored head.
    #[serde(default = "default_index")]
    pub start_index: i64,
    /// -1 syncs until an end condition or shutdown.
    #[serde(default = "default_index")]
    pub end_index: i64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub end_conditions: EndConditions,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_data_dir() -> String { "chainsync-data".to_string() }
fn default_sync_concurrency() -> usize { DEFAULT_CONCURRENCY }
fn default_block_cache_size() -> usize { chainsync_storage::DEFAULT_BLOCK_CACHE_SIZE }
fn default_index() -> i64 { -1 }
fn default_timeout_secs() -> u64 { 10 }
fn default_max_retries() -> u32 { 5 }
fn default_initial_backoff_ms() -> u64 { 250 }
fn default_max_backoff_ms() -> u64 { 10_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl NodeConfig {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            url: self.online_url.clone(),
            timeout_secs: self.retry.timeout_secs,
            max_retries: self.retry.max_retries,
            initial_backoff_ms: self.retry.initial_backoff_ms,
            max_backoff_ms: self.retry.max_backoff_ms,
        }
    }
}
