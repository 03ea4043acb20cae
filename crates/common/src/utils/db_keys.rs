use crate::types::BlockIdentifier;

const BLOCK_HASH_PREFIX: &[u8] = b"block/hash/";
const BLOCK_INDEX_PREFIX: &[u8] = b"block/index/";
const TX_PREFIX: &[u8] = b"tx/";
const COUNTER_PREFIX: &[u8] = b"counter/";
pub const HEAD_BLOCK_KEY: &[u8] = b"head-block";

pub fn block_hash_to_db_key(hash: &str) -> Vec<u8> {
    prefixed(BLOCK_HASH_PREFIX, hash.as_bytes())
}

/// Index keys are big-endian so a prefix scan walks blocks in chain order.
pub fn block_index_to_db_key(index: i64) -> Vec<u8> {
    prefixed(BLOCK_INDEX_PREFIX, &(index as u64).to_be_bytes())
}

pub fn tx_hash_to_db_key(tx_hash: &str, block: &BlockIdentifier) -> Vec<u8> {
    // tx/{tx_hash}/{block_hash}: the same transaction may land in competing blocks
    let mut key = prefixed(TX_PREFIX, tx_hash.as_bytes());
    key.push(b'/');
    key.extend_from_slice(block.hash.as_bytes());
    key
}

pub fn tx_hash_prefix(tx_hash: &str) -> Vec<u8> {
    let mut key = prefixed(TX_PREFIX, tx_hash.as_bytes());
    key.push(b'/');
    key
}

pub fn counter_to_db_key(name: &str) -> Vec<u8> {
    prefixed(COUNTER_PREFIX, name.as_bytes())
}

fn prefixed(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}
