use clap::Parser;
use gdax_feed::{resolve_product_ids, GDAX_API_URL, GDAX_WS_URL};
use std::net::SocketAddr;
use std::time::Duration;

use crate::coordinator::CoordinatorOptions;
use crate::error::ConfigError;

/// gdax-scraper: record the GDAX order feed and order book snapshots into PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "gdax-scraper", version)]
pub struct Args {
    /// PostgreSQL connection string
    #[arg(short = 'd', long, alias = "database", env = "DATABASE_URL")]
    pub database_url: String,

    /// Comma-separated product ids, or "all"
    #[arg(short, long, env = "PRODUCTS", value_delimiter = ',', default_value = "all")]
    pub products: Vec<String>,

    /// Minutes between order book snapshots
    #[arg(short, long, env = "SNAPSHOTS_INTERVAL", default_value_t = 60)]
    pub snapshots_interval: u64,

    /// Buffer messages and snapshots and insert them in bulk
    #[arg(short, long)]
    pub batch: bool,

    /// Log every recorded message and snapshot
    #[arg(short, long)]
    pub verbose: bool,

    /// WebSocket feed endpoint
    #[arg(long, env = "FEED_URL", default_value = GDAX_WS_URL)]
    pub feed_url: String,

    /// REST API base URL for order book snapshots
    #[arg(long, env = "API_URL", default_value = GDAX_API_URL)]
    pub api_url: String,

    /// Feed channel to subscribe to
    #[arg(long, env = "FEED_CHANNEL", default_value = "full")]
    pub channel: String,

    /// Batch flush interval in milliseconds
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value_t = 1000)]
    pub flush_interval_ms: u64,

    /// Snapshot requests per second
    #[arg(long, env = "RATE_LIMIT", default_value_t = 3)]
    pub rate_limit: usize,

    /// Capacity of each pipeline queue
    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = 10_000)]
    pub channel_capacity: usize,

    /// Health/metrics listen address (disabled when unset)
    #[arg(long, env = "LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub database_url: String,
    pub products: Vec<String>,
    pub snapshots_interval: Duration,
    pub feed_url: String,
    pub api_url: String,
    pub channel: String,
    pub rate_limit: usize,
    pub channel_capacity: usize,
    pub listen_addr: Option<SocketAddr>,
    pub coordinator: CoordinatorOptions,
}

impl Args {
    pub fn into_config(self) -> Result<RecorderConfig, ConfigError> {
        if self.snapshots_interval == 0 {
            return Err(ConfigError::Invalid("snapshots interval must be at least 1 minute".into()));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::Invalid("rate limit must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel capacity must be at least 1".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid("flush interval must be positive".into()));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Invalid("feed channel must not be empty".into()));
        }

        let products = resolve_product_ids(&self.products)?;

        Ok(RecorderConfig {
            database_url: self.database_url,
            products,
            snapshots_interval: Duration::from_secs(self.snapshots_interval * 60),
            feed_url: self.feed_url,
            api_url: self.api_url,
            channel: self.channel,
            rate_limit: self.rate_limit,
            channel_capacity: self.channel_capacity,
            listen_addr: self.listen_addr,
            coordinator: CoordinatorOptions {
                batch: self.batch,
                verbose: self.verbose,
                flush_interval: Duration::from_millis(self.flush_interval_ms),
                channel_capacity: self.channel_capacity,
            },
        })
    }
}
