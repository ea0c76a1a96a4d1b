use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("subscription failed: {0}")]
    Subscribe(String),

    #[error("could not decode message: {reason} (raw: {raw})")]
    Decode { reason: String, raw: String },

    #[error("connection closed")]
    Closed,
}

impl FeedError {
    /// Whether the stream is unusable after this error.
    ///
    /// Only decode failures are scoped to a single frame; everything else ends
    /// the subscription, since the feed is never reconnected.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FeedError::Decode { .. })
    }
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("request for {product_id} failed: {reason}")]
    Request { product_id: String, reason: String },

    #[error("request for {product_id} timed out after {timeout_ms}ms")]
    Timeout { product_id: String, timeout_ms: u64 },

    #[error("invalid response from server for {product_id}: HTTP {status}")]
    Status { product_id: String, status: u16 },

    #[error("could not decode order book for {product_id}: {reason}")]
    Decode { product_id: String, reason: String },

    #[error("malformed {side} level {index} for {product_id}: {reason}")]
    MalformedLevel {
        product_id: String,
        side: &'static str,
        index: usize,
        reason: String,
    },
}

impl SnapshotError {
    /// Product whose snapshot failed
    pub fn product_id(&self) -> &str {
        match self {
            SnapshotError::Request { product_id, .. }
            | SnapshotError::Timeout { product_id, .. }
            | SnapshotError::Status { product_id, .. }
            | SnapshotError::Decode { product_id, .. }
            | SnapshotError::MalformedLevel { product_id, .. } => product_id,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProductError {
    #[error("invalid product id: {0}")]
    Unknown(String),
}
