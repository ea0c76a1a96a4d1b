//! gdax-scraper binary entry point

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gdax_feed::{Channel, FeedSubscriber, RestSnapshotClient, WebSocketFeed};
use gdax_scraper::server::run_server;
use gdax_scraper::{Args, Coordinator, Metrics, PgStore, SnapshotPoller, Store};

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "gdax_scraper=debug,gdax_feed=debug"
    } else {
        "gdax_scraper=info,gdax_feed=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Cancel `shutdown` on SIGTERM or SIGINT
fn spawn_signal_handler(shutdown: CancellationToken) {
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT handler");

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received, shutting down gracefully"),
            _ = sigint.recv() => info!("SIGINT received, shutting down gracefully"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);
    let config = args.into_config()?;

    info!(
        products = ?config.products,
        snapshots_interval_secs = config.snapshots_interval.as_secs(),
        batch = config.coordinator.batch,
        feed_url = %config.feed_url,
        "Starting gdax-scraper"
    );

    let store = PgStore::connect(&config.database_url).context("could not create the database pool")?;
    store.ping().await.context("could not connect to the database")?;
    store
        .prepare_schema()
        .await
        .context("could not prepare the database")?;
    let store: Arc<dyn Store> = Arc::new(store);

    let metrics = Arc::new(Metrics::new()?);
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    if let Some(addr) = config.listen_addr {
        let metrics = Arc::clone(&metrics);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(addr, metrics, shutdown).await {
                error!(error = %e, "health/metrics server failed");
            }
        });
    }

    let feed = WebSocketFeed::connect(&config.feed_url)
        .await
        .context("could not connect to the feed")?;
    let (feed_tx, feed_rx) = mpsc::channel(config.channel_capacity);
    let subscriber = FeedSubscriber::spawn(
        feed,
        vec![Channel::new(config.channel.as_str(), config.products.clone())],
        feed_tx,
    );

    let fetcher = Arc::new(RestSnapshotClient::new(config.api_url.as_str())?);
    let (snapshot_tx, snapshot_rx) = mpsc::channel(config.channel_capacity);
    let poller = SnapshotPoller::new(fetcher, config.rate_limit, config.snapshots_interval).spawn(
        config.products.clone(),
        snapshot_tx,
        shutdown.clone(),
    );

    let result = Coordinator::new(store, config.coordinator, metrics)
        .run(feed_rx, snapshot_rx, shutdown.clone())
        .await;

    shutdown.cancel();
    subscriber.abort();
    if let Err(e) = poller.await {
        error!(error = %e, "Snapshot poller task failed");
    }

    result.context("recording stopped")?;
    info!("gdax-scraper stopped");
    Ok(())
}
