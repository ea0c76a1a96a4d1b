//! Rate-limited order book snapshot poller
//!
//! Every poll interval the poller fetches one snapshot per product. Fetches
//! are dispatched in chunks of `rate_limit`, one chunk per tick of a
//! one-second rate ticker. The rate ticker lives as long as the poller, so
//! the limit also holds across back-to-back cycles. A cycle completes once
//! every product has resolved, success or failure.

use futures_util::FutureExt;
use gdax_feed::{SnapshotError, SnapshotFetcher, SnapshotRecord};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Window the rate limit applies to
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Upstream public limit on order book requests per second
pub const DEFAULT_RATE_LIMIT: usize = 3;

/// Outcome of one poll cycle
#[derive(Debug, Default)]
pub struct CycleResult {
    pub snapshots: HashMap<String, SnapshotRecord>,
    pub errors: Vec<SnapshotError>,
}

impl CycleResult {
    /// Products resolved in this cycle
    pub fn resolved(&self) -> usize {
        self.snapshots.len() + self.errors.len()
    }
}

pub struct SnapshotPoller {
    fetcher: Arc<dyn SnapshotFetcher>,
    rate_limit: usize,
    interval: Duration,
    rate_ticker: Option<Interval>,
}

impl SnapshotPoller {
    /// `rate_limit` below 1 is treated as 1
    pub fn new(fetcher: Arc<dyn SnapshotFetcher>, rate_limit: usize, interval: Duration) -> Self {
        Self {
            fetcher,
            rate_limit: rate_limit.max(1),
            interval,
            rate_ticker: None,
        }
    }

    /// Fetch every product once and wait for all of them to resolve
    pub async fn poll_cycle(&mut self, products: &[String]) -> CycleResult {
        let mut seen = HashSet::new();
        let products: Vec<&str> = products
            .iter()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect();
        if products.is_empty() {
            return CycleResult::default();
        }

        let (tx, mut rx) = mpsc::channel(products.len());
        let ticker = self.rate_ticker.get_or_insert_with(|| {
            let mut ticker = interval(RATE_WINDOW);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        for chunk in products.chunks(self.rate_limit) {
            ticker.tick().await;
            for product_id in chunk {
                debug!(product_id = %product_id, "Dispatching snapshot fetch");
                let fetcher = Arc::clone(&self.fetcher);
                let tx = tx.clone();
                let product_id = product_id.to_string();
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(fetcher.fetch(&product_id))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(SnapshotError::Request {
                                product_id: product_id.clone(),
                                reason: "fetch task panicked".to_string(),
                            })
                        });
                    let _ = tx.send((product_id, outcome)).await;
                });
            }
        }
        drop(tx);

        let mut result = CycleResult::default();
        while let Some((product_id, outcome)) = rx.recv().await {
            match outcome {
                Ok(snapshot) => {
                    result.snapshots.insert(product_id, snapshot);
                }
                Err(e) => result.errors.push(e),
            }
        }
        result
    }

    /// Run a cycle now and then every poll interval until `shutdown`
    pub fn spawn(
        self,
        products: Vec<String>,
        tx: mpsc::Sender<CycleResult>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let mut poller = self;
        tokio::spawn(async move {
            let mut ticker = interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut cycle: u64 = 0;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                cycle += 1;
                let started = Instant::now();
                let result = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = poller.poll_cycle(&products) => result,
                };
                info!(
                    cycle,
                    snapshots = result.snapshots.len(),
                    errors = result.errors.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Snapshot cycle complete"
                );

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    sent = tx.send(result) => {
                        if sent.is_err() {
                            debug!("Snapshot receiver dropped, stopping poller");
                            break;
                        }
                    }
                }
            }
            info!(cycles = cycle, "Snapshot poller stopped");
        })
    }
}
