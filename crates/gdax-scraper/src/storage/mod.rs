//! Storage sink for feed events and order book snapshots

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use gdax_feed::{EventRecord, SnapshotRecord};

use crate::error::StorageError;

pub use memory::{MemoryStore, WriteCall};
pub use postgres::{create_pool, PgStore};

/// Write path into the `messages` and `snapshots` tables.
///
/// Every method returns the number of rows written. Bulk methods are all or
/// nothing: either every row lands or none does.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_event(&self, event: &EventRecord) -> Result<u64, StorageError>;

    async fn insert_events(&self, events: &[EventRecord]) -> Result<u64, StorageError>;

    /// One row per level of the snapshot
    async fn insert_snapshot(&self, snapshot: &SnapshotRecord) -> Result<u64, StorageError> {
        self.insert_snapshots(std::slice::from_ref(snapshot)).await
    }

    async fn insert_snapshots(&self, snapshots: &[SnapshotRecord]) -> Result<u64, StorageError>;
}
