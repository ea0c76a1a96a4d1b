//! Level-3 order book snapshots

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::SnapshotError;

/// Raw body of `GET /products/{id}/book?level=3`
///
/// Levels stay as string lists until [`OrderBookResponse::into_snapshot`] so a
/// malformed entry is reported with its side and position.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    pub sequence: i64,
    #[serde(default)]
    pub bids: Vec<Vec<String>>,
    #[serde(default)]
    pub asks: Vec<Vec<String>>,
}

/// One resting order in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
    pub order_id: String,
}

/// Full order book of one product at `sequence`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub product_id: String,
    pub sequence: i64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

pub const BID: &str = "bid";
pub const ASK: &str = "ask";

impl SnapshotRecord {
    /// Levels flattened into storage rows, bids first
    pub fn rows(&self) -> impl Iterator<Item = (&'static str, &Level)> {
        self.bids
            .iter()
            .map(|level| (BID, level))
            .chain(self.asks.iter().map(|level| (ASK, level)))
    }

    pub fn level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

impl OrderBookResponse {
    /// Parse every level into typed decimals.
    ///
    /// All or nothing: the first malformed level fails the snapshot.
    pub fn into_snapshot(self, product_id: &str) -> Result<SnapshotRecord, SnapshotError> {
        let bids = parse_levels(product_id, BID, self.bids)?;
        let asks = parse_levels(product_id, ASK, self.asks)?;

        Ok(SnapshotRecord {
            product_id: product_id.to_string(),
            sequence: self.sequence,
            bids,
            asks,
        })
    }
}

fn parse_levels(
    product_id: &str,
    side: &'static str,
    raw: Vec<Vec<String>>,
) -> Result<Vec<Level>, SnapshotError> {
    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_level(entry).map_err(|reason| SnapshotError::MalformedLevel {
                product_id: product_id.to_string(),
                side,
                index,
                reason,
            })
        })
        .collect()
}

fn parse_level(entry: Vec<String>) -> Result<Level, String> {
    let len = entry.len();
    let [price, size, order_id]: [String; 3] = entry
        .try_into()
        .map_err(|_| format!("expected [price, size, order_id], got {len} fields"))?;

    let price = Decimal::from_str_exact(&price).map_err(|e| format!("price {price:?}: {e}"))?;
    let size = Decimal::from_str_exact(&size).map_err(|e| format!("size {size:?}: {e}"))?;

    Ok(Level {
        price,
        size,
        order_id,
    })
}
