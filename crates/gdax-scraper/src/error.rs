//! Error types for gdax-scraper

use gdax_feed::{FeedError, ProductError};
use thiserror::Error;

/// Storage sink failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("pool setup failed: {0}")]
    PoolSetup(String),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Write refused by the sink itself (used by the in-memory store)
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Product(#[from] ProductError),
}

/// Pipeline-level failures surfaced to the binary
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("feed terminated: {0}")]
    FeedTerminated(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_error_passes_through() {
        let err: ConfigError = ProductError::Unknown("XRP-USD".to_string()).into();
        assert_eq!(err.to_string(), "invalid product id: XRP-USD");
    }

    #[test]
    fn test_feed_terminated_display() {
        let err = RecorderError::FeedTerminated("connection closed".to_string());
        assert_eq!(err.to_string(), "feed terminated: connection closed");
    }
}
