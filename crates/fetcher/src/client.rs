use std::time::Duration;

use async_trait::async_trait;
use chainsync_common::error::{FetchError, Result, SyncError};
use chainsync_common::traits::BlockSource;
use chainsync_common::types::{Block, NetworkIdentifier, NetworkStatusResponse, PartialBlockIdentifier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::retry::Backoff;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Base URL of the node's Data API.
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_timeout_secs() -> u64 { 10 }
fn default_max_retries() -> u32 { 5 }
fn default_initial_backoff_ms() -> u64 { 250 }
fn default_max_backoff_ms() -> u64 { 10_000 }

impl FetcherConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.max_retries,
        )
    }
}

/// Error body returned by the Data API.
#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    code: i32,
    message: String,
    #[serde(default)]
    retriable: bool,
}

#[derive(Serialize)]
struct NetworkRequest<'a> {
    network_identifier: &'a NetworkIdentifier,
}

#[derive(Serialize)]
struct BlockRequest<'a> {
    network_identifier: &'a NetworkIdentifier,
    block_identifier: &'a PartialBlockIdentifier,
}

#[derive(Deserialize)]
struct BlockResponse {
    #[serde(default)]
    block: Option<Block>,
}

/// Outcome of one attempt: whether trying again could help.
enum Attempt {
    Retry(FetchError),
    Fatal(FetchError),
}

pub struct Fetcher {
    base_url: String,
    client: reqwest::Client,
    backoff: Backoff,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Request(format!("unable to build client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            backoff: config.backoff(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> std::result::Result<Resp, Attempt>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(FetchError::Request(e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| Attempt::Fatal(FetchError::InvalidResponse(e.to_string())));
        }

        let code = status.as_u16();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiError>(&text) {
            Ok(api) => {
                let err = FetchError::Status {
                    code,
                    message: format!("{} (code {})", api.message, api.code),
                };
                if api.retriable || status.is_server_error() {
                    Err(Attempt::Retry(err))
                } else {
                    Err(Attempt::Fatal(err))
                }
            }
            Err(_) => {
                let err = FetchError::Status { code, message: text };
                if status.is_server_error() || code == 429 {
                    Err(Attempt::Retry(err))
                } else {
                    Err(Attempt::Fatal(err))
                }
            }
        }
    }

    async fn post_retry<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            match self.post(path, body).await {
                Ok(resp) => return Ok(resp),
                Err(Attempt::Fatal(err)) => return Err(SyncError::Fetch(err)),
                Err(Attempt::Retry(err)) => {
                    attempt += 1;
                    let delay = match self.backoff.delay(attempt) {
                        Some(delay) => delay,
                        None => {
                            return Err(FetchError::RetriesExhausted {
                                attempts: attempt,
                                last: err.to_string(),
                            }
                            .into())
                        }
                    };
                    warn!(path, attempt, "Request failed, retrying in {:?}: {}", delay, err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl BlockSource for Fetcher {
    async fn network_status_retry(&self, network: &NetworkIdentifier) -> Result<NetworkStatusResponse> {
        self.post_retry(
            "network/status",
            &NetworkRequest {
                network_identifier: network,
            },
        )
        .await
    }

    async fn block_retry(
        &self,
        network: &NetworkIdentifier,
        block: &PartialBlockIdentifier,
    ) -> Result<Option<Block>> {
        let response: BlockResponse = self
            .post_retry(
                "block",
                &BlockRequest {
                    network_identifier: network,
                    block_identifier: block,
                },
            )
            .await?;

        if response.block.is_none() {
            debug!(index = ?block.index, "Node omitted block");
        }
        Ok(response.block)
    }
}
