//! Syncer module
//!
//! Provides blockchain synchronization functionality.

pub mod end_conditions;
pub mod engine;
pub mod stateful;

pub use end_conditions::EndConditions;
pub use engine::{Handler, Helper, Syncer};
pub use stateful::StatefulSyncer;
