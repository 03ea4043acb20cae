pub mod config;
pub mod event_logger;
pub mod logging;
pub mod service;
pub mod syncer;

pub use config::NodeConfig;
pub use event_logger::{EventLogConfig, FileEventLogger};
pub use service::SyncNode;
pub use syncer::{EndConditions, StatefulSyncer};
