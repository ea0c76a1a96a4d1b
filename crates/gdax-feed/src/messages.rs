//! GDAX full-channel message types
//!
//! Every frame on the feed decodes into one flat [`EventRecord`]; fields that a
//! given event kind does not carry are simply absent. Sizes, prices and funds
//! are sent as JSON strings and decoded straight into [`Decimal`], never via f64.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event from the feed (open, done, match, change, received, error, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event kind, kept string-typed so unknown kinds still decode
    #[serde(rename = "type")]
    pub kind: String,
    pub product_id: Option<String>,
    pub trade_id: Option<i64>,
    pub order_id: Option<String>,
    /// Per-product sequence number, passed through untouched
    pub sequence: Option<i64>,
    pub maker_order_id: Option<String>,
    pub taker_order_id: Option<String>,
    /// Exchange timestamp of the event (not ingestion time)
    pub time: Option<DateTime<Utc>>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub remaining_size: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub new_size: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub old_size: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub size: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    pub side: Option<Side>,
    pub reason: Option<String>,
    pub order_type: Option<String>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub funds: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub new_funds: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub old_funds: Option<Decimal>,
    /// Only set on `error` events
    pub message: Option<String>,
}

impl EventRecord {
    /// Empty record of the given kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            product_id: None,
            trade_id: None,
            order_id: None,
            sequence: None,
            maker_order_id: None,
            taker_order_id: None,
            time: None,
            remaining_size: None,
            new_size: None,
            old_size: None,
            size: None,
            price: None,
            side: None,
            reason: None,
            order_type: None,
            funds: None,
            new_funds: None,
            old_funds: None,
            message: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == "error"
    }
}

/// Channel descriptor inside a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub product_ids: Vec<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>, product_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            product_ids,
        }
    }
}

/// Initial control message declaring the channels to receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub channels: Vec<Channel>,
}

impl SubscribeRequest {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            kind: "subscribe",
            channels,
        }
    }
}
