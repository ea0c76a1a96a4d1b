//! GDAX REST order book client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::book::{OrderBookResponse, SnapshotRecord};
use crate::error::SnapshotError;
use crate::traits::SnapshotFetcher;

/// GDAX public REST API
pub const GDAX_API_URL: &str = "https://api.gdax.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Fetches level-3 order books, one request per product
pub struct RestSnapshotClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl RestSnapshotClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gdax-feed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn book_url(&self, product_id: &str) -> String {
        format!("{}/products/{}/book?level=3", self.base_url, product_id)
    }
}

#[async_trait]
impl SnapshotFetcher for RestSnapshotClient {
    async fn fetch(&self, product_id: &str) -> Result<SnapshotRecord, SnapshotError> {
        let url = self.book_url(product_id);
        debug!(url = %url, "GET order book");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SnapshotError::Timeout {
                    product_id: product_id.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                SnapshotError::Request {
                    product_id: product_id.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if resp.status() != StatusCode::OK {
            return Err(SnapshotError::Status {
                product_id: product_id.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let book: OrderBookResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                SnapshotError::Timeout {
                    product_id: product_id.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                SnapshotError::Decode {
                    product_id: product_id.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        book.into_snapshot(product_id)
    }
}
