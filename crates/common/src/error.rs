use thiserror::Error;

/// Common error types for chainsync
#[derive(Error, Debug)]
pub enum SyncError {
    /// Storage related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Errors talking to the remote data source
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// An error annotated with what was being attempted
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SyncError>,
    },

    /// The sync engine could not make progress
    #[error("Syncer error: {0}")]
    Syncer(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Block and counter storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store holds no blocks yet.
    #[error("head block not found")]
    HeadBlockNotFound,

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("block {0} already exists")]
    DuplicateBlock(String),

    #[error("block {block} does not extend head {head}")]
    NotChildOfHead { block: String, head: String },

    #[error("block {block} is not the head {head}")]
    NotHead { block: String, head: String },

    #[error("last processed block {head} is less than start index {start}")]
    StartIndexAhead { head: i64, start: i64 },

    #[error("start index {0} is negative")]
    NegativeStartIndex(i64),

    #[error("database failure: {0}")]
    Database(String),

    #[error("corrupt entry: {0}")]
    Corruption(String),
}

/// Remote data source errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// True when this error, or any error it wraps, is a missing head block.
    pub fn is_head_not_found(&self) -> bool {
        match self {
            SyncError::Storage(StorageError::HeadBlockNotFound) => true,
            SyncError::Context { source, .. } => source.is_head_not_found(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

/// Error context helper
pub trait ErrorContext<T> {
    fn with_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<SyncError>,
{
    fn with_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SyncError::Context {
            context: context(),
            source: Box::new(e.into()),
        })
    }
}
