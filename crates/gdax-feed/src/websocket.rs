//! GDAX WebSocket feed client
//!
//! Thin transport over tokio-tungstenite. Frames are returned raw; decoding
//! happens in [`crate::subscriber`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::FeedError;
use crate::messages::SubscribeRequest;
use crate::traits::FeedSource;

/// GDAX public WebSocket feed
pub const GDAX_WS_URL: &str = "wss://ws-feed.gdax.com";

pub struct WebSocketFeed {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketFeed {
    /// Dial the feed endpoint
    pub async fn connect(url: &str) -> Result<Self, FeedError> {
        let url = Url::parse(url).map_err(|e| FeedError::ConnectionFailed(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(FeedError::ConnectionFailed(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        info!(url = %url, "Connecting to GDAX feed");
        let (ws, response) = connect_async(url.as_str()).await?;
        info!(status = ?response.status(), "GDAX feed connected");

        Ok(Self { ws })
    }
}

#[async_trait]
impl FeedSource for WebSocketFeed {
    async fn send(&mut self, request: &SubscribeRequest) -> Result<(), FeedError> {
        let msg = serde_json::to_string(request).map_err(|e| FeedError::Subscribe(e.to_string()))?;
        debug!(cmd = %msg, "Sending subscribe request");
        self.ws.send(Message::Text(msg)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>, FeedError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received WS ping, sending pong");
                    self.ws.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "GDAX feed closed by server");
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
