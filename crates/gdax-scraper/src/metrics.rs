use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::StorageError;

/// Recorder counters, registered on a registry owned by this struct
pub struct Metrics {
    pub registry: Registry,
    pub events_received: IntCounterVec,
    pub decode_errors: IntCounter,
    pub snapshot_cycles: IntCounter,
    pub snapshot_fetch_errors: IntCounterVec,
    pub rows_written: IntCounterVec,
    pub write_failures: IntCounterVec,
    pub batch_flushes: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_received = IntCounterVec::new(
            Opts::new("gdax_scraper_events_received_total", "Feed events decoded"),
            &["type"],
        )?;
        let decode_errors = IntCounter::new(
            "gdax_scraper_decode_errors_total",
            "Feed frames that could not be decoded",
        )?;
        let snapshot_cycles = IntCounter::new(
            "gdax_scraper_snapshot_cycles_total",
            "Completed snapshot poll cycles",
        )?;
        let snapshot_fetch_errors = IntCounterVec::new(
            Opts::new("gdax_scraper_snapshot_fetch_errors_total", "Failed snapshot fetches"),
            &["product_id"],
        )?;
        let rows_written = IntCounterVec::new(
            Opts::new("gdax_scraper_rows_written_total", "Rows written to storage"),
            &["table"],
        )?;
        let write_failures = IntCounterVec::new(
            Opts::new("gdax_scraper_write_failures_total", "Failed storage writes"),
            &["table"],
        )?;
        let batch_flushes = IntCounterVec::new(
            Opts::new("gdax_scraper_batch_flushes_total", "Non-empty batch flushes"),
            &["table"],
        )?;

        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(snapshot_cycles.clone()))?;
        registry.register(Box::new(snapshot_fetch_errors.clone()))?;
        registry.register(Box::new(rows_written.clone()))?;
        registry.register(Box::new(write_failures.clone()))?;
        registry.register(Box::new(batch_flushes.clone()))?;

        Ok(Self {
            registry,
            events_received,
            decode_errors,
            snapshot_cycles,
            snapshot_fetch_errors,
            rows_written,
            write_failures,
            batch_flushes,
        })
    }

    /// Record the outcome of one storage write
    pub fn record_write(&self, table: &str, result: &Result<u64, StorageError>) {
        match result {
            Ok(rows) => self.rows_written.with_label_values(&[table]).inc_by(*rows),
            Err(_) => self.write_failures.with_label_values(&[table]).inc(),
        }
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.events_received.with_label_values(&["match"]).inc();
        metrics.record_write("messages", &Ok(12));
        metrics.record_write("snapshots", &Err(StorageError::Rejected("down".to_string())));

        let text = metrics.render().unwrap();
        assert!(text.contains("gdax_scraper_events_received_total{type=\"match\"} 1"));
        assert!(text.contains("gdax_scraper_rows_written_total{table=\"messages\"} 12"));
        assert!(text.contains("gdax_scraper_write_failures_total{table=\"snapshots\"} 1"));
    }

    #[test]
    fn test_independent_registries() {
        // two instances must not collide
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.decode_errors.inc();
        assert_eq!(b.decode_errors.get(), 0);
    }
}
