pub mod block_storage;
pub mod counter_storage;
pub mod memory;
pub mod sled;
pub mod workers;

pub use block_storage::{BlockStorage, DEFAULT_BLOCK_CACHE_SIZE};
pub use counter_storage::CounterStorage;
pub use memory::MemoryDB;
pub use sled::SledDB;
pub use workers::TransactionIndexWorker;
