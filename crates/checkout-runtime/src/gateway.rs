//! HTTP Order Gateway
//!
//! Client view of the order service:
//!
//! ```text
//! GET /api/orders/session/{session_id}   200 Order | 404 not yet created
//! PUT /api/orders/{order_id}/status      {"status": "processing"}
//! ```
//!
//! A 404 is an ordinary miss for the poller, not an error.

use async_trait::async_trait;
use checkout_core::{CheckoutError, Order, OrderGateway, OrderStatus, Result};
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::{ServerConfig, path_segment};

#[derive(Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

/// `OrderGateway` over the checkout server's REST API
pub struct HttpOrderGateway {
    client: reqwest::Client,
    config: ServerConfig,
}

impl HttpOrderGateway {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CheckoutError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ServerConfig::from_env())
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn get_order(&self, session_id: &str) -> Result<Option<Order>> {
        let url = self
            .config
            .endpoint(&format!("/api/orders/session/{}", path_segment(session_id)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CheckoutError::Gateway(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let order = response
                    .json::<Order>()
                    .await
                    .map_err(|e| CheckoutError::Gateway(format!("invalid order body: {e}")))?;
                Ok(Some(order))
            }
            status => Err(CheckoutError::Gateway(format!(
                "order lookup returned {status}"
            ))),
        }
    }

    async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> Result<()> {
        let url = self
            .config
            .endpoint(&format!("/api/orders/{}/status", path_segment(order_id)))?;

        let response = self
            .client
            .put(url)
            .json(&StatusUpdate { status })
            .send()
            .await
            .map_err(|e| CheckoutError::Gateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CheckoutError::Gateway(format!(
                "status update returned {}",
                response.status()
            )));
        }

        tracing::debug!(order_id = %order_id, status = %status, "Order status updated");
        Ok(())
    }
}
