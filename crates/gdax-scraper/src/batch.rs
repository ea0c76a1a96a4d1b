//! Batch buffer: accumulate records, bulk write on a flush tick
//!
//! Pushes and the flush swap share one lock, so a record pushed while a flush
//! is in progress lands in exactly one generation of the buffer. A generation
//! is written once; on failure it is reported and dropped, never retried.

use futures_util::future::BoxFuture;
use gdax_feed::{EventRecord, SnapshotRecord};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::payload::{MESSAGES_TABLE, SNAPSHOTS_TABLE};
use crate::storage::Store;

/// Record types that can be bulk written by a [`BatchBuffer`]
pub trait Batchable: Sized + Send + Sync + 'static {
    /// Table the records land in
    const KIND: &'static str;

    fn write_batch<'a>(store: &'a dyn Store, batch: &'a [Self]) -> BoxFuture<'a, Result<u64, StorageError>>;
}

impl Batchable for EventRecord {
    const KIND: &'static str = MESSAGES_TABLE;

    fn write_batch<'a>(store: &'a dyn Store, batch: &'a [Self]) -> BoxFuture<'a, Result<u64, StorageError>> {
        store.insert_events(batch)
    }
}

impl Batchable for SnapshotRecord {
    const KIND: &'static str = SNAPSHOTS_TABLE;

    fn write_batch<'a>(store: &'a dyn Store, batch: &'a [Self]) -> BoxFuture<'a, Result<u64, StorageError>> {
        store.insert_snapshots(batch)
    }
}

/// Result of one non-empty flush
#[derive(Debug)]
pub struct FlushOutcome {
    pub kind: &'static str,
    /// Records taken from the buffer
    pub records: usize,
    /// Rows written
    pub result: Result<u64, StorageError>,
}

pub struct BatchBuffer<T> {
    store: Arc<dyn Store>,
    pending: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for BatchBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T: Batchable> BatchBuffer<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, record: T) {
        self.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap out the current generation for an empty one
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Write everything buffered so far as one bulk write.
    ///
    /// Returns `None` without touching the store when the buffer is empty.
    pub async fn flush(&self) -> Option<FlushOutcome> {
        let batch = self.take();
        if batch.is_empty() {
            return None;
        }

        let result = T::write_batch(self.store.as_ref(), &batch).await;
        Some(FlushOutcome {
            kind: T::KIND,
            records: batch.len(),
            result,
        })
    }

    /// Flush every `interval` on a dedicated task until `shutdown`, then
    /// flush once more so nothing buffered is left behind.
    pub fn spawn(
        &self,
        interval: Duration,
        outcomes: mpsc::Sender<FlushOutcome>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let buffer = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(outcome) = buffer.flush().await {
                            report(&outcomes, outcome).await;
                        }
                    }
                }
            }

            debug!(kind = T::KIND, pending = buffer.len(), "Final flush");
            if let Some(outcome) = buffer.flush().await {
                report(&outcomes, outcome).await;
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn report(outcomes: &mpsc::Sender<FlushOutcome>, outcome: FlushOutcome) {
    if let Err(mpsc::error::SendError(outcome)) = outcomes.send(outcome).await {
        warn!(
            kind = outcome.kind,
            records = outcome.records,
            ok = outcome.result.is_ok(),
            "Flush outcome dropped, receiver closed"
        );
    }
}
