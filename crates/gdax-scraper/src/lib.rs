//! gdax-scraper: ingestion pipeline for the GDAX order feed
//!
//! Feed events and periodic order book snapshots converge on a single
//! [`Coordinator`] which writes them to a [`Store`], either one record at a
//! time or through [`BatchBuffer`]s flushed on a timer.

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod poller;
pub mod server;
pub mod storage;

pub use batch::{BatchBuffer, Batchable, FlushOutcome};
pub use config::{Args, RecorderConfig};
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::{ConfigError, RecorderError, StorageError};
pub use metrics::Metrics;
pub use poller::{CycleResult, SnapshotPoller};
pub use storage::{MemoryStore, PgStore, Store};

pub type Result<T> = std::result::Result<T, RecorderError>;
