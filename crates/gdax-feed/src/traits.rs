use async_trait::async_trait;

use crate::book::SnapshotRecord;
use crate::error::{FeedError, SnapshotError};
use crate::messages::SubscribeRequest;

/// Streaming feed transport (WebSocket in production, scripted in tests)
#[async_trait]
pub trait FeedSource: Send {
    /// Send the subscription control message
    async fn send(&mut self, request: &SubscribeRequest) -> Result<(), FeedError>;

    /// Next raw text frame. `Ok(None)` once the stream has closed.
    async fn receive(&mut self) -> Result<Option<String>, FeedError>;

    async fn close(&mut self) -> Result<(), FeedError> {
        Ok(())
    }
}

/// Order book snapshot source
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, product_id: &str) -> Result<SnapshotRecord, SnapshotError>;
}
