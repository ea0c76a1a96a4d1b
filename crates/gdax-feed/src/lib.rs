//! gdax-feed: exchange-facing collaborators for the GDAX recorder
//!
//! This crate provides the live order feed (WebSocket full channel), the
//! level-3 order book snapshot client (REST), and the record types both produce.

pub mod book;
pub mod error;
pub mod messages;
pub mod products;
pub mod rest;
pub mod subscriber;
pub mod traits;
pub mod websocket;

pub use book::{Level, OrderBookResponse, SnapshotRecord};
pub use error::{FeedError, ProductError, SnapshotError};
pub use messages::{Channel, EventRecord, Side, SubscribeRequest};
pub use products::{resolve_product_ids, DEFAULT_PRODUCT_IDS};
pub use rest::{RestSnapshotClient, GDAX_API_URL};
pub use subscriber::{decode_event, FeedItem, FeedSubscriber};
pub use traits::{FeedSource, SnapshotFetcher};
pub use websocket::{WebSocketFeed, GDAX_WS_URL};
