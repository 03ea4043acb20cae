//! Client for a node's Data API.

pub mod client;
pub mod retry;

pub use client::{Fetcher, FetcherConfig};
pub use retry::Backoff;
