//! Feed subscription task
//!
//! Sends one subscribe request, then forwards every frame as a decoded
//! [`EventRecord`] or a [`FeedError`], never both for the same frame. The
//! stream is not reconnected: a transport failure or close is reported once
//! and the task ends, which closes the channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::messages::{Channel, EventRecord, SubscribeRequest};
use crate::traits::FeedSource;

/// One receive outcome
pub type FeedItem = Result<EventRecord, FeedError>;

/// Decode one raw frame
pub fn decode_event(raw: &str) -> Result<EventRecord, FeedError> {
    serde_json::from_str(raw).map_err(|e| FeedError::Decode {
        reason: e.to_string(),
        raw: raw.to_string(),
    })
}

pub struct FeedSubscriber;

impl FeedSubscriber {
    /// Subscribe on `source` and run the receive loop on its own task
    pub fn spawn<S>(source: S, channels: Vec<Channel>, tx: mpsc::Sender<FeedItem>) -> JoinHandle<()>
    where
        S: FeedSource + 'static,
    {
        tokio::spawn(Self::run(source, SubscribeRequest::new(channels), tx))
    }

    async fn run<S: FeedSource>(mut source: S, request: SubscribeRequest, tx: mpsc::Sender<FeedItem>) {
        let product_count: usize = request.channels.iter().map(|c| c.product_ids.len()).sum();
        if let Err(e) = source.send(&request).await {
            error!(error = %e, "Failed to send subscription");
            let _ = tx.send(Err(FeedError::Subscribe(e.to_string()))).await;
            return;
        }
        info!(
            channels = request.channels.len(),
            products = product_count,
            "Feed subscription sent"
        );

        loop {
            let item = match source.receive().await {
                Ok(Some(raw)) => decode_event(&raw),
                Ok(None) => {
                    warn!("Feed stream closed");
                    let _ = tx.send(Err(FeedError::Closed)).await;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Feed transport error");
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            };

            if tx.send(item).await.is_err() {
                debug!("Feed receiver dropped, stopping subscriber");
                break;
            }
        }

        if let Err(e) = source.close().await {
            debug!(error = %e, "Error closing feed source");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted source: replays frames, then reports end of stream
    struct MockSource {
        frames: VecDeque<Result<Option<String>, FeedError>>,
        sent: Arc<Mutex<Vec<SubscribeRequest>>>,
        fail_send: bool,
    }

    impl MockSource {
        fn new(frames: Vec<Result<Option<String>, FeedError>>) -> Self {
            Self {
                frames: frames.into(),
                sent: Arc::new(Mutex::new(Vec::new())),
                fail_send: false,
            }
        }
    }

    #[async_trait]
    impl FeedSource for MockSource {
        async fn send(&mut self, request: &SubscribeRequest) -> Result<(), FeedError> {
            if self.fail_send {
                return Err(FeedError::ConnectionFailed("broken pipe".to_string()));
            }
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn receive(&mut self) -> Result<Option<String>, FeedError> {
            self.frames.pop_front().unwrap_or(Ok(None))
        }
    }

    fn text(raw: &str) -> Result<Option<String>, FeedError> {
        Ok(Some(raw.to_string()))
    }

    fn channels() -> Vec<Channel> {
        vec![Channel::new("full", vec!["BTC-USD".to_string()])]
    }

    async fn collect(mut rx: mpsc::Receiver<FeedItem>) -> Vec<FeedItem> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_sends_subscription_first() {
        let source = MockSource::new(vec![]);
        let sent = Arc::clone(&source.sent);
        let (tx, rx) = mpsc::channel(8);

        FeedSubscriber::spawn(source, channels(), tx).await.unwrap();
        let items = collect(rx).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "subscribe");
        assert_eq!(sent[0].channels[0].product_ids, vec!["BTC-USD"]);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn test_forwards_events_in_receive_order() {
        let source = MockSource::new(vec![
            text(r#"{"type":"received","product_id":"BTC-USD","sequence":1}"#),
            text(r#"{"type":"open","product_id":"BTC-USD","sequence":2,"remaining_size":"1.5"}"#),
            text(r#"{"type":"done","product_id":"BTC-USD","sequence":3}"#),
        ]);
        let (tx, rx) = mpsc::channel(8);

        FeedSubscriber::spawn(source, channels(), tx).await.unwrap();
        let items = collect(rx).await;

        let sequences: Vec<i64> = items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .filter_map(|event| event.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(matches!(items.last(), Some(Err(FeedError::Closed))));
    }

    #[tokio::test]
    async fn test_decode_error_is_exclusive_of_record() {
        let source = MockSource::new(vec![
            text(r#"{"type":"match","sequence":1}"#),
            text("{not json"),
            text(r#"{"type":"match","sequence":2}"#),
        ]);
        let (tx, rx) = mpsc::channel(8);

        FeedSubscriber::spawn(source, channels(), tx).await.unwrap();
        let items = collect(rx).await;

        // two records, one decode error, one close
        assert_eq!(items.len(), 4);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(FeedError::Decode { raw, .. }) => assert_eq!(raw, "{not json"),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert_eq!(items[2].as_ref().unwrap().sequence, Some(2));
        assert!(matches!(items[3], Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let source = MockSource::new(vec![
            text(r#"{"type":"open","sequence":1}"#),
            Err(FeedError::ConnectionFailed("reset by peer".to_string())),
            text(r#"{"type":"open","sequence":2}"#),
        ]);
        let (tx, rx) = mpsc::channel(8);

        FeedSubscriber::spawn(source, channels(), tx).await.unwrap();
        let items = collect(rx).await;

        assert_eq!(items.len(), 2);
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_terminal() {
        let mut source = MockSource::new(vec![text(r#"{"type":"open"}"#)]);
        source.fail_send = true;
        let (tx, rx) = mpsc::channel(8);

        FeedSubscriber::spawn(source, channels(), tx).await.unwrap();
        let items = collect(rx).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(FeedError::Subscribe(_))));
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let frames = (0..100)
            .map(|i| text(&format!(r#"{{"type":"open","sequence":{i}}}"#)))
            .collect();
        let source = MockSource::new(frames);
        let (tx, mut rx) = mpsc::channel(1);

        let handle = FeedSubscriber::spawn(source, channels(), tx);
        assert!(rx.recv().await.unwrap().is_ok());
        drop(rx);

        handle.await.unwrap();
    }

    #[test]
    fn test_decode_event() {
        let event = decode_event(r#"{"type":"open","product_id":"ETH-USD","side":"sell"}"#).unwrap();
        assert_eq!(event.kind, "open");
        assert!(decode_event("").is_err());
    }
}
