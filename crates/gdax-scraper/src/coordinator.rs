//! Coordinator: single write path for feed events and snapshot cycles
//!
//! One loop waits on whichever source is ready first (feed, poller, batch
//! flush outcomes, detached snapshot writes, shutdown) and routes the item.
//! All queues are bounded, so a slow writer pushes back on producers instead
//! of growing memory.

use gdax_feed::{EventRecord, FeedItem, SnapshotRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchBuffer, FlushOutcome};
use crate::error::{RecorderError, StorageError};
use crate::metrics::Metrics;
use crate::payload::{MESSAGES_TABLE, SNAPSHOTS_TABLE};
use crate::poller::CycleResult;
use crate::storage::Store;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Buffer records and bulk write them on each flush tick
    pub batch: bool,
    /// Echo every record at info level
    pub verbose: bool,
    pub flush_interval: Duration,
    /// Capacity of the flush outcome queue
    pub channel_capacity: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            batch: false,
            verbose: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

type SnapshotWrite = (String, Result<u64, StorageError>);

enum Inbound {
    Feed(Option<FeedItem>),
    Snapshots(Option<CycleResult>),
    Flushed(Option<FlushOutcome>),
    WriteDone(Result<SnapshotWrite, JoinError>),
    Shutdown,
}

/// Every input of the coordinator loop
struct Sources {
    feed: mpsc::Receiver<FeedItem>,
    snapshots: mpsc::Receiver<CycleResult>,
    outcomes: mpsc::Receiver<FlushOutcome>,
    snapshots_open: bool,
    outcomes_open: bool,
}

impl Sources {
    /// Wait for the next ready input. Ready branches are picked at random.
    async fn next(
        &mut self,
        writes: &mut JoinSet<SnapshotWrite>,
        shutdown: &CancellationToken,
    ) -> Inbound {
        tokio::select! {
            _ = shutdown.cancelled() => Inbound::Shutdown,
            item = self.feed.recv() => Inbound::Feed(item),
            cycle = self.snapshots.recv(), if self.snapshots_open => Inbound::Snapshots(cycle),
            outcome = self.outcomes.recv(), if self.outcomes_open => Inbound::Flushed(outcome),
            Some(done) = writes.join_next(), if !writes.is_empty() => Inbound::WriteDone(done),
        }
    }
}

struct Buffers {
    events: BatchBuffer<EventRecord>,
    snapshots: BatchBuffer<SnapshotRecord>,
}

pub struct Coordinator {
    store: Arc<dyn Store>,
    options: CoordinatorOptions,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, options: CoordinatorOptions, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            options,
            metrics,
        }
    }

    /// Run until `shutdown` is cancelled or the feed terminates.
    ///
    /// Either way buffered records and in-flight snapshot writes are drained
    /// before returning. A terminated feed is an error since it is never
    /// reconnected.
    pub async fn run(
        self,
        feed: mpsc::Receiver<FeedItem>,
        snapshots: mpsc::Receiver<CycleResult>,
        shutdown: CancellationToken,
    ) -> Result<(), RecorderError> {
        let (outcome_tx, outcome_rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let flush_shutdown = CancellationToken::new();
        let mut flushers = Vec::new();

        let buffers = if self.options.batch {
            let buffers = Buffers {
                events: BatchBuffer::new(Arc::clone(&self.store)),
                snapshots: BatchBuffer::new(Arc::clone(&self.store)),
            };
            flushers.push(buffers.events.spawn(
                self.options.flush_interval,
                outcome_tx.clone(),
                flush_shutdown.clone(),
            ));
            flushers.push(buffers.snapshots.spawn(
                self.options.flush_interval,
                outcome_tx.clone(),
                flush_shutdown.clone(),
            ));
            Some(buffers)
        } else {
            None
        };
        drop(outcome_tx);

        let mut sources = Sources {
            feed,
            snapshots,
            outcomes: outcome_rx,
            snapshots_open: true,
            outcomes_open: true,
        };
        let mut writes = JoinSet::new();

        info!(
            batch = self.options.batch,
            flush_interval_ms = self.options.flush_interval.as_millis() as u64,
            "Coordinator running"
        );

        let exit = loop {
            match sources.next(&mut writes, &shutdown).await {
                Inbound::Shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                Inbound::Feed(Some(Ok(event))) => self.handle_event(event, buffers.as_ref()).await,
                Inbound::Feed(Some(Err(e))) => {
                    if e.is_terminal() {
                        error!(error = %e, "Feed terminated");
                        break Err(RecorderError::FeedTerminated(e.to_string()));
                    }
                    self.metrics.decode_errors.inc();
                    warn!(error = %e, "Dropping undecodable feed message");
                }
                Inbound::Feed(None) => {
                    error!("Feed channel closed");
                    break Err(RecorderError::FeedTerminated("feed channel closed".to_string()));
                }
                Inbound::Snapshots(Some(cycle)) => {
                    self.handle_cycle(cycle, buffers.as_ref(), &mut writes)
                }
                Inbound::Snapshots(None) => {
                    warn!("Snapshot poller stopped");
                    sources.snapshots_open = false;
                }
                Inbound::Flushed(Some(outcome)) => self.log_flush(outcome),
                Inbound::Flushed(None) => sources.outcomes_open = false,
                Inbound::WriteDone(done) => self.log_snapshot_write(done),
            }
        };

        self.drain(&mut sources, &mut writes, flush_shutdown, flushers)
            .await;
        exit
    }

    async fn handle_event(&self, event: EventRecord, buffers: Option<&Buffers>) {
        self.metrics
            .events_received
            .with_label_values(&[event.kind.as_str()])
            .inc();
        if event.is_error() {
            warn!(message = ?event.message, "Error event from feed");
        }
        if self.options.verbose {
            info!(?event, "Message");
        }

        match buffers {
            Some(buffers) => buffers.events.push(event),
            None => {
                let result = self.store.insert_event(&event).await;
                self.metrics.record_write(MESSAGES_TABLE, &result);
                if let Err(e) = result {
                    error!(
                        error = %e,
                        kind = %event.kind,
                        sequence = ?event.sequence,
                        "Could not insert message"
                    );
                }
            }
        }
    }

    fn handle_cycle(
        &self,
        cycle: CycleResult,
        buffers: Option<&Buffers>,
        writes: &mut JoinSet<SnapshotWrite>,
    ) {
        self.metrics.snapshot_cycles.inc();
        for e in &cycle.errors {
            self.metrics
                .snapshot_fetch_errors
                .with_label_values(&[e.product_id()])
                .inc();
            warn!(product_id = %e.product_id(), error = %e, "Snapshot fetch failed");
        }

        for (product_id, snapshot) in cycle.snapshots {
            if self.options.verbose {
                info!(
                    product_id = %product_id,
                    sequence = snapshot.sequence,
                    bids = snapshot.bids.len(),
                    asks = snapshot.asks.len(),
                    "Snapshot"
                );
            }

            match buffers {
                Some(buffers) => buffers.snapshots.push(snapshot),
                None => {
                    let store = Arc::clone(&self.store);
                    writes.spawn(async move {
                        let result = store.insert_snapshot(&snapshot).await;
                        (product_id, result)
                    });
                }
            }
        }
    }

    fn log_flush(&self, outcome: FlushOutcome) {
        self.metrics
            .batch_flushes
            .with_label_values(&[outcome.kind])
            .inc();
        self.metrics.record_write(outcome.kind, &outcome.result);
        match &outcome.result {
            Ok(rows) => debug!(kind = outcome.kind, records = outcome.records, rows, "Batch written"),
            Err(e) => error!(
                kind = outcome.kind,
                records = outcome.records,
                error = %e,
                "Batch write failed, records dropped"
            ),
        }
    }

    fn log_snapshot_write(&self, done: Result<SnapshotWrite, JoinError>) {
        match done {
            Ok((product_id, result)) => {
                self.metrics.record_write(SNAPSHOTS_TABLE, &result);
                match result {
                    Ok(rows) => debug!(product_id = %product_id, rows, "Snapshot written"),
                    Err(e) => error!(product_id = %product_id, error = %e, "Could not insert snapshot"),
                }
            }
            Err(e) => error!(error = %e, "Snapshot write task failed"),
        }
    }

    /// Finish in-flight snapshot writes, then stop the flushers and log their
    /// final outcomes.
    async fn drain(
        &self,
        sources: &mut Sources,
        writes: &mut JoinSet<SnapshotWrite>,
        flush_shutdown: CancellationToken,
        flushers: Vec<tokio::task::JoinHandle<()>>,
    ) {
        if !writes.is_empty() {
            info!(pending = writes.len(), "Waiting for snapshot writes");
        }
        while let Some(done) = writes.join_next().await {
            self.log_snapshot_write(done);
        }

        flush_shutdown.cancel();
        while let Some(outcome) = sources.outcomes.recv().await {
            self.log_flush(outcome);
        }
        for flusher in flushers {
            if let Err(e) = flusher.await {
                error!(error = %e, "Flush task failed");
            }
        }
        info!("Coordinator drained");
    }
}
