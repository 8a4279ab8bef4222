//! HTTP relay client
//!
//! A relay is a plain order bucket: `GET` returns every order it has seen and
//! `POST` accepts an array of orders. Relays are not trusted, every fetched
//! order still goes through validation.

use crate::domain::order::Order;
use crate::domain::wire::decode_orders;
use crate::infrastructure::config::{RelayConfig, RelayEndpoint};
use async_trait::async_trait;
use ethers::types::H256;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),

    #[error("No relay endpoint reachable")]
    NoEndpointReachable,
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Source and sink of orders over HTTP
#[async_trait]
pub trait OrderRelay: Send + Sync {
    /// Snapshot of every configured relay, concatenated
    async fn fetch_orders(&self) -> Result<Vec<Order>>;

    /// Publish orders, returns the hashes that reached at least one relay
    async fn post_orders(&self, orders: &[Order]) -> Result<Vec<H256>>;
}

/// reqwest-backed relay client, endpoints are contacted one after another
pub struct RelayClient {
    endpoints: Vec<RelayEndpoint>,
    max_post: usize,
    client: Client,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoints: config.endpoints.clone(),
            max_post: config.max_post.max(1),
            client,
        })
    }

    pub fn endpoints(&self) -> &[RelayEndpoint] {
        &self.endpoints
    }

    async fn fetch_endpoint(&self, endpoint: &RelayEndpoint) -> Result<Vec<Order>> {
        debug!("GET {}", endpoint.get_url);

        let response = self.client.get(&endpoint.get_url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::ApiError(format!(
                "Failed to fetch orders ({}): {}",
                status, error_text
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RelayError::DeserializeFailed(e.to_string()))?;

        if !payload.is_array() {
            return Err(RelayError::DeserializeFailed(
                "relay snapshot is not an array".to_string(),
            ));
        }

        let raw_count = payload.as_array().map(Vec::len).unwrap_or_default();
        let orders = decode_orders(&payload);

        debug!(
            url = %endpoint.get_url,
            raw = raw_count,
            decoded = orders.len(),
            "Fetched relay snapshot"
        );

        Ok(orders)
    }

    async fn post_endpoint(&self, endpoint: &RelayEndpoint, orders: &[Order]) -> Result<()> {
        let response = self
            .client
            .post(&endpoint.post_url)
            .json(orders)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RelayError::ApiError(format!(
                "Failed to post orders ({}): {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl OrderRelay for RelayClient {
    async fn fetch_orders(&self) -> Result<Vec<Order>> {
        let mut all_orders = Vec::new();
        let mut reachable = 0;

        for endpoint in &self.endpoints {
            match self.fetch_endpoint(endpoint).await {
                Ok(orders) => {
                    reachable += 1;
                    all_orders.extend(orders);
                }
                Err(e) => {
                    warn!(url = %endpoint.get_url, error = %e, "Error loading orders from relay");
                }
            }
        }

        if reachable == 0 && !self.endpoints.is_empty() {
            return Err(RelayError::NoEndpointReachable);
        }

        info!("Fetched {} orders from {} relays", all_orders.len(), reachable);
        Ok(all_orders)
    }

    async fn post_orders(&self, orders: &[Order]) -> Result<Vec<H256>> {
        if orders.is_empty() || self.endpoints.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_count = orders.len().div_ceil(self.max_post);
        let mut posted = Vec::with_capacity(orders.len());

        for chunk in orders.chunks(self.max_post) {
            let mut delivered = false;

            for endpoint in &self.endpoints {
                match self.post_endpoint(endpoint, chunk).await {
                    Ok(()) => {
                        debug!(
                            url = %endpoint.post_url,
                            orders = chunk.len(),
                            chunks = chunk_count,
                            "Posted orders to relay"
                        );
                        delivered = true;
                    }
                    Err(e) => {
                        warn!(url = %endpoint.post_url, error = %e, "Error publishing orders chunk");
                    }
                }
            }

            if delivered {
                posted.extend(chunk.iter().map(|order| order.hash));
            }
        }

        if posted.is_empty() {
            return Err(RelayError::NoEndpointReachable);
        }

        Ok(posted)
    }
}
