use async_trait::async_trait;
use gdax_feed::{EventRecord, SnapshotRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::Store;
use crate::error::StorageError;
use crate::payload::{MESSAGES_TABLE, SNAPSHOTS_TABLE};

/// One call into the store, successful or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub table: &'static str,
    /// Records passed in (events, or snapshots for the snapshots table)
    pub records: usize,
    pub bulk: bool,
}

#[derive(Default)]
struct Inner {
    events: Vec<EventRecord>,
    snapshots: Vec<SnapshotRecord>,
    calls: Vec<WriteCall>,
}

/// In-process [`Store`] that keeps everything it is given
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    failing: Arc<AtomicBool>,
    write_delays: HashMap<&'static str, Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes into `table` sleep for `delay` before completing
    pub fn with_write_delay(mut self, table: &'static str, delay: Duration) -> Self {
        self.write_delays.insert(table, delay);
        self
    }

    /// Reject every write while set. Calls are still recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<EventRecord> {
        self.inner.read().await.events.clone()
    }

    pub async fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.inner.read().await.snapshots.clone()
    }

    pub async fn calls(&self) -> Vec<WriteCall> {
        self.inner.read().await.calls.clone()
    }

    async fn record_call(&self, table: &'static str, records: usize, bulk: bool) -> Result<(), StorageError> {
        if let Some(delay) = self.write_delays.get(table) {
            tokio::time::sleep(*delay).await;
        }
        self.inner
            .write()
            .await
            .calls
            .push(WriteCall { table, records, bulk });

        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected(format!("{table} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_event(&self, event: &EventRecord) -> Result<u64, StorageError> {
        self.record_call(MESSAGES_TABLE, 1, false).await?;
        self.inner.write().await.events.push(event.clone());
        Ok(1)
    }

    async fn insert_events(&self, events: &[EventRecord]) -> Result<u64, StorageError> {
        self.record_call(MESSAGES_TABLE, events.len(), true).await?;
        self.inner.write().await.events.extend_from_slice(events);
        Ok(events.len() as u64)
    }

    async fn insert_snapshots(&self, snapshots: &[SnapshotRecord]) -> Result<u64, StorageError> {
        self.record_call(SNAPSHOTS_TABLE, snapshots.len(), true).await?;
        self.inner
            .write()
            .await
            .snapshots
            .extend_from_slice(snapshots);
        Ok(snapshots.iter().map(|s| s.level_count() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdax_feed::Level;
    use rust_decimal::Decimal;

    fn snapshot(product_id: &str, levels: usize) -> SnapshotRecord {
        let level = Level {
            price: Decimal::new(10_000, 2),
            size: Decimal::ONE,
            order_id: "o".to_string(),
        };
        SnapshotRecord {
            product_id: product_id.to_string(),
            sequence: 1,
            bids: vec![level.clone(); levels],
            asks: vec![level; levels],
        }
    }

    #[tokio::test]
    async fn test_records_writes() {
        let store = MemoryStore::new();
        store.insert_event(&EventRecord::new("open")).await.unwrap();
        store
            .insert_events(&[EventRecord::new("match"), EventRecord::new("done")])
            .await
            .unwrap();

        assert_eq!(store.events().await.len(), 3);
        let calls = store.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].bulk);
        assert_eq!(calls[1].records, 2);
    }

    #[tokio::test]
    async fn test_snapshot_rows_count_levels() {
        let store = MemoryStore::new();
        let rows = store.insert_snapshot(&snapshot("BTC-USD", 2)).await.unwrap();
        assert_eq!(rows, 4);
        assert_eq!(store.snapshots().await[0].product_id, "BTC-USD");
    }

    #[tokio::test]
    async fn test_failing_store_keeps_nothing() {
        let store = MemoryStore::new();
        store.set_failing(true);

        let err = store.insert_events(&[EventRecord::new("open")]).await.unwrap_err();
        assert!(matches!(err, StorageError::Rejected(_)));
        assert!(store.events().await.is_empty());
        assert_eq!(store.calls().await.len(), 1);

        store.set_failing(false);
        store.insert_event(&EventRecord::new("open")).await.unwrap();
        assert_eq!(store.events().await.len(), 1);
    }
}
