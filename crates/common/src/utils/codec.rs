use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Serialize any serde-compatible type to JSON bytes.
/// Blocks carry free-form JSON metadata, which rules out non-self-describing formats.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| SyncError::Serialization(format!("encode failed: {}", e)))
}

/// Deserialize JSON bytes to a type.
pub fn deserialize<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| SyncError::Serialization(format!("decode failed: {}", e)))
}
