use std::sync::Arc;

use async_trait::async_trait;
use chainsync_common::error::{Result, StorageError};
use chainsync_common::traits::{CounterStore, DBInterface};
use chainsync_common::utils::db_keys;
use tokio::sync::Mutex;

/// Named monotonic counters persisted as big-endian integers.
pub struct CounterStorage {
    db: Arc<dyn DBInterface>,
    /// Makes read-modify-write of a counter atomic.
    update_lock: Mutex<()>,
}

impl CounterStorage {
    pub fn new(db: Arc<dyn DBInterface>) -> Self {
        Self {
            db,
            update_lock: Mutex::new(()),
        }
    }

    async fn load(&self, counter: &str) -> Result<i64> {
        let raw = self
            .db
            .get(&db_keys::counter_to_db_key(counter))
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        match raw {
            None => Ok(0),
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corruption(format!("counter {} has {} bytes", counter, bytes.len()))
                })?;
                Ok(i64::from_be_bytes(arr))
            }
        }
    }
}

#[async_trait]
impl CounterStore for CounterStorage {
    async fn update(&self, counter: &str, delta: i64) -> Result<i64> {
        let _guard = self.update_lock.lock().await;

        let value = self.load(counter).await?.saturating_add(delta);
        self.db
            .insert(&db_keys::counter_to_db_key(counter), &value.to_be_bytes())
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(value)
    }

    async fn get(&self, counter: &str) -> Result<i64> {
        self.load(counter).await
    }
}
