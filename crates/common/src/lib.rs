pub mod error;
pub mod traits;
pub mod types;
pub mod utils;

pub use error::{ErrorContext, FetchError, Result, StorageError, SyncError};
